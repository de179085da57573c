//! Pure classification and normalization helpers for image references.
//!
//! A reference is whatever a caller hands us to identify an image: an
//! upstream asset URL, an app-proxied path, a raw base64 payload, or a
//! data URI. Everything here is deterministic and side-effect free.

use sha2::{Digest, Sha256};

const GENERATED_HOST_IMAGINE: &str = "imagine-public.x.ai";
const GENERATED_HOST_ASSETS: &str = "assets.grok.com";
const LOCAL_IMAGE_PROXY_MARKER: &str = "/v1/files/image/";
const IMAGINE_PUBLIC_PATH_MARKER: &str = "/imagine-public/images/";
const BASE64_MIN_LEN: usize = 128;

/// How a reference was classified by [`inspect_image_reference`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Raw base64 payload or data URI.
    Base64,
    /// URL pointing at upstream-generated content.
    GeneratedUrl { normalized: String },
    /// URL pointing at user-uploaded content, with the asset id when the
    /// path shape carries one.
    UploadedUrl {
        normalized: String,
        asset_id: Option<String>,
    },
    /// An http(s) URL that matches no known upstream shape.
    UnknownUrl { normalized: String },
}

#[must_use]
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Canonicalize an image URL for use as a ledger key.
///
/// Lowercases scheme and host, drops query and fragment, and strips a
/// trailing slash on non-root paths. Data URIs and local proxy paths pass
/// through untouched, as do values that do not parse as URLs. Idempotent:
/// normalizing an already normalized value returns it unchanged.
#[must_use]
pub fn normalize_image_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("data:") || trimmed.starts_with('/') {
        return trimmed.to_string();
    }
    let Ok(mut parsed) = url::Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return trimmed.to_string();
    }
    parsed.set_query(None);
    parsed.set_fragment(None);
    let mut out = parsed.to_string();
    if out.ends_with('/') && parsed.path() != "/" {
        out.pop();
    }
    out
}

/// Extract the asset id from an uploaded-content URL of the shape
/// `.../users/<user>/<asset_id>/content`.
#[must_use]
pub fn extract_asset_id_from_url(url: &str) -> Option<String> {
    let (_, tail) = url.split_once("/users/")?;
    let mut segments = tail.split('/');
    let _user = segments.next()?;
    let asset_id = segments.next()?;
    if segments.next()? != "content" || asset_id.is_empty() {
        return None;
    }
    Some(asset_id.to_string())
}

/// Heuristic for raw base64 image payloads: a base64 data URI, or a long
/// non-URL string drawn entirely from the base64 alphabet.
#[must_use]
pub fn looks_like_base64(value: &str) -> bool {
    let value = value.trim();
    if value.starts_with("data:") && value.contains("base64,") {
        return true;
    }
    if is_http_url(value) || value.starts_with('/') {
        return false;
    }
    value.len() >= BASE64_MIN_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=' | b'\n' | b'\r'))
}

fn is_generated_image_url(url: &str) -> bool {
    if url.contains(LOCAL_IMAGE_PROXY_MARKER) || url.contains(IMAGINE_PUBLIC_PATH_MARKER) {
        return true;
    }
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };
    match parsed.host_str() {
        Some(GENERATED_HOST_IMAGINE) => true,
        Some(GENERATED_HOST_ASSETS) => parsed.path().contains("/generated/"),
        _ => false,
    }
}

/// Classify a caller-supplied image reference.
#[must_use]
pub fn inspect_image_reference(reference: &str) -> ReferenceKind {
    let reference = reference.trim();
    if looks_like_base64(reference) {
        return ReferenceKind::Base64;
    }
    let normalized = normalize_image_url(reference);
    if is_generated_image_url(&normalized) {
        return ReferenceKind::GeneratedUrl { normalized };
    }
    if let Some(asset_id) = extract_asset_id_from_url(&normalized) {
        return ReferenceKind::UploadedUrl {
            normalized,
            asset_id: Some(asset_id),
        };
    }
    ReferenceKind::UnknownUrl { normalized }
}

/// Sha-256 hex digest of a decoded base64 image payload. Strips any data
/// URI prefix and embedded whitespace, and restores missing padding.
#[must_use]
pub fn sha256_of_image_base64(b64: &str) -> Option<String> {
    use base64::Engine as _;

    let payload = b64
        .split_once("base64,")
        .map_or(b64, |(_, rest)| rest)
        .trim();
    let mut cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return None;
    }
    while cleaned.len() % 4 != 0 {
        cleaned.push('=');
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(cleaned.as_bytes())
        .ok()?;
    Some(hex_string(&Sha256::digest(&bytes)))
}

/// Ledger lookup key: sha-256 hex of `"{key_type}:{key_value}"`.
#[must_use]
pub fn lookup_key(key_type: &str, key_value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key_type.as_bytes());
    hasher.update(b":");
    hasher.update(key_value.as_bytes());
    hex_string(&hasher.finalize())
}

fn hex_string(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(HEX[(byte >> 4) as usize]));
        out.push(char::from(HEX[(byte & 0x0f) as usize]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            "HTTPS://Assets.Grok.com/path/img.png?sig=abc#frag",
            "https://assets.grok.com/dir/",
            "https://assets.grok.com/",
            "/v1/files/image/imagine-public/images/abc.png",
            "data:image/png;base64,QUJD",
            "not a url at all",
        ];
        for input in inputs {
            let once = normalize_image_url(input);
            let twice = normalize_image_url(&once);
            assert_eq!(once, twice, "normalization not idempotent for {input}");
        }
        assert_eq!(
            normalize_image_url("HTTPS://Assets.Grok.com/path/img.png?sig=abc#frag"),
            "https://assets.grok.com/path/img.png"
        );
        assert_eq!(
            normalize_image_url("https://assets.grok.com/dir/"),
            "https://assets.grok.com/dir"
        );
    }

    #[test]
    fn generated_urls_are_detected() {
        let generated = inspect_image_reference(
            "https://assets.grok.com/users/u1/generated/gen-1/image.jpg?sig=x",
        );
        assert!(matches!(generated, ReferenceKind::GeneratedUrl { .. }));

        let imagine =
            inspect_image_reference("https://imagine-public.x.ai/imagine-public/images/a.png");
        assert!(matches!(imagine, ReferenceKind::GeneratedUrl { .. }));

        let proxied = inspect_image_reference("/v1/files/image/imagine-public/images/a.png");
        assert!(matches!(proxied, ReferenceKind::GeneratedUrl { .. }));
    }

    #[test]
    fn uploaded_urls_carry_asset_id() {
        match inspect_image_reference("https://assets.grok.com/users/u1/asset-9/content") {
            ReferenceKind::UploadedUrl { asset_id, .. } => {
                assert_eq!(asset_id.as_deref(), Some("asset-9"));
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn long_base64_blob_is_base64() {
        let blob = "iVBORw0KGgoAAAANSUhEUg".repeat(16);
        assert!(blob.len() >= 300);
        assert_eq!(inspect_image_reference(&blob), ReferenceKind::Base64);
        assert_eq!(
            inspect_image_reference("data:image/png;base64,QUJD"),
            ReferenceKind::Base64
        );
    }

    #[test]
    fn short_or_url_values_are_not_base64() {
        assert!(!looks_like_base64("QUJD"));
        assert!(!looks_like_base64("https://example.com/QUJDQUJD"));
    }

    #[test]
    fn unknown_url_falls_through() {
        assert!(matches!(
            inspect_image_reference("https://example.com/cat.png"),
            ReferenceKind::UnknownUrl { .. }
        ));
    }

    #[test]
    fn base64_hash_ignores_prefix_and_whitespace() {
        let with_prefix = sha256_of_image_base64("data:image/png;base64,QUJD").unwrap();
        let plain = sha256_of_image_base64("QUJD").unwrap();
        let spaced = sha256_of_image_base64("QU\nJD").unwrap();
        assert_eq!(with_prefix, plain);
        assert_eq!(plain, spaced);
        assert_eq!(plain.len(), 64);
    }

    #[test]
    fn lookup_keys_differ_by_type() {
        let by_url = lookup_key("url", "https://assets.grok.com/a.png");
        let by_hash = lookup_key("hash", "https://assets.grok.com/a.png");
        assert_ne!(by_url, by_hash);
        assert_eq!(by_url, lookup_key("url", "https://assets.grok.com/a.png"));
    }
}
