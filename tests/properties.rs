//! Property tests for URL keys, similarity and tokens.

use proptest::prelude::*;

use a3s_image_search::{
    normalize_url, similarity_ratio, Copyright, TokenCodec, TokenPayload,
};

fn url_strategy() -> impl Strategy<Value = String> {
    (
        prop_oneof![Just("http://"), Just("https://"), Just("HTTPS://"), Just("")],
        prop_oneof![Just(""), Just("www."), Just("WWW.")],
        "[a-z]{1,10}\\.(com|org|net)",
        prop::collection::vec("[A-Za-z0-9_\\-]{1,8}", 0..4),
        prop_oneof![Just(""), Just("/thumb/a/b/")],
        "[A-Za-z0-9]{1,8}",
        prop_oneof![Just(""), Just("_800x600"), Just("_1x1_20x20")],
        prop_oneof![Just(".jpg"), Just(".PNG"), Just("")],
        prop_oneof![Just(""), Just("?w=100&h=200")],
    )
        .prop_map(|(scheme, www, host, dirs, thumb, file, suffix, ext, query)| {
            let mut path = dirs.join("/");
            if !path.is_empty() {
                path.push('/');
            }
            format!("{scheme}{www}{host}/{path}{thumb}{file}{suffix}{ext}{query}")
        })
}

fn payload_strategy() -> impl Strategy<Value = TokenPayload> {
    (
        "[a-z]{1,8}_[a-z0-9]{1,12}",
        "\\PC{0,60}",
        "https://[a-z]{1,10}\\.com/[a-z0-9/]{0,20}",
        prop::collection::vec("[A-Za-z ]{1,12}", 1..4),
        0u32..10_000,
        0u32..10_000,
        "\\PC{0,20}",
        any::<bool>(),
    )
        .prop_map(|(id, title, url, sources, width, height, photographer, free)| TokenPayload {
            id,
            title,
            source_page_url: url.clone(),
            download_url: url,
            source: sources[0].clone(),
            sources,
            width,
            height,
            size_estimate: "1.0 MB".to_string(),
            photographer,
            copyright: if free {
                Copyright::free("CC0", false)
            } else {
                Copyright::unknown()
            },
        })
}

proptest! {
    #[test]
    fn normalize_url_is_idempotent(url in url_strategy()) {
        let once = normalize_url(&url);
        prop_assert_eq!(normalize_url(&once), once);
    }

    #[test]
    fn normalize_url_is_idempotent_on_arbitrary_text(text in "\\PC{0,80}") {
        let once = normalize_url(&text);
        prop_assert_eq!(normalize_url(&once), once);
    }

    #[test]
    fn dimension_suffix_does_not_change_key(url in url_strategy()) {
        let key = normalize_url(&url);
        if let Some((stem, ext)) = key.rsplit_once('.') {
            if !stem.contains('/') || ext.contains('/') {
                return Ok(());
            }
            let sized = format!("https://{}_640x480.{}", stem, ext);
            prop_assert_eq!(normalize_url(&sized), key);
        }
    }

    #[test]
    fn similarity_is_bounded(a in "\\PC{0,40}", b in "\\PC{0,40}") {
        let ratio = similarity_ratio(&a, &b);
        prop_assert!((0.0..=1.0).contains(&ratio));
    }

    #[test]
    fn similarity_is_reflexive(s in "\\PC{0,60}") {
        prop_assert_eq!(similarity_ratio(&s, &s), 1.0);
    }

    #[test]
    fn token_round_trips(payload in payload_strategy()) {
        let codec = TokenCodec::new("property-secret");
        let token = codec.encode(&payload).unwrap();
        prop_assert_eq!(codec.decode(&token).unwrap(), payload);
    }

    #[test]
    fn decoding_garbage_never_panics(garbage in "\\PC{0,120}") {
        let codec = TokenCodec::new("property-secret");
        prop_assert!(codec.decode(&garbage).is_err());
    }
}
