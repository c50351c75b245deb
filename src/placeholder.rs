//! SVG placeholder served when an image cannot be proxied.

/// Placeholder width in pixels.
pub const WIDTH: u32 = 400;
/// Placeholder height in pixels.
pub const HEIGHT: u32 = 300;
/// `Cache-Control` sent with a placeholder.
pub const CACHE_CONTROL: &str = "public, max-age=300";

const MAX_CAPTION_CHARS: usize = 60;

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if c.is_control() => out.push(' '),
            c => out.push(c),
        }
    }
    out
}

fn truncate_caption(caption: &str) -> String {
    if caption.chars().count() <= MAX_CAPTION_CHARS {
        return caption.to_string();
    }
    let short: String = caption.chars().take(MAX_CAPTION_CHARS).collect();
    // Prefer ending on a whole word unless that drops most of the caption.
    match short.rfind(char::is_whitespace) {
        Some(cut) if cut >= MAX_CAPTION_CHARS / 2 => short[..cut].trim_end().to_string(),
        _ => short,
    }
}

/// Renders the placeholder image with a short diagnostic caption.
///
/// Output depends only on the caption.
pub fn render_placeholder(caption: &str) -> String {
    let caption = escape_xml(&truncate_caption(caption.trim()));
    format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">
  <rect width="{w}" height="{h}" fill="#f1f3f5"/>
  <rect x="170" y="95" width="60" height="50" rx="6" fill="none" stroke="#adb5bd" stroke-width="4"/>
  <circle cx="186" cy="111" r="6" fill="#adb5bd"/>
  <path d="M174 141 L196 121 L210 133 L218 126 L226 141 Z" fill="#adb5bd"/>
  <text x="200" y="185" font-family="sans-serif" font-size="16" fill="#495057" text-anchor="middle">Image unavailable</text>
  <text x="200" y="210" font-family="sans-serif" font-size="12" fill="#868e96" text-anchor="middle">{caption}</text>
</svg>"##,
        w = WIDTH,
        h = HEIGHT,
        caption = caption,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_is_deterministic() {
        assert_eq!(render_placeholder("timeout"), render_placeholder("timeout"));
        assert_ne!(render_placeholder("timeout"), render_placeholder("404"));
    }

    #[test]
    fn test_placeholder_dimensions() {
        let svg = render_placeholder("x");
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains(r#"width="400""#));
        assert!(svg.contains(r#"height="300""#));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn test_placeholder_escapes_caption() {
        let svg = render_placeholder("<script>alert('x')</script> & more");
        assert!(!svg.contains("<script>"));
        assert!(svg.contains("&lt;script&gt;"));
        assert!(svg.contains("&amp; more"));
    }

    #[test]
    fn test_placeholder_truncates_long_caption() {
        let long = "a".repeat(200);
        let svg = render_placeholder(&long);
        assert!(svg.contains(&format!(">{}<", "a".repeat(60))));
        assert!(!svg.contains(&"a".repeat(61)));
        assert!(!svg.contains("..."));
    }

    #[test]
    fn test_placeholder_truncates_at_word_boundary() {
        let caption = "all 3 attempts failed: error sending request for url https://example.com/cat.png";
        assert_eq!(
            truncate_caption(caption),
            "all 3 attempts failed: error sending request for url"
        );
    }
}
