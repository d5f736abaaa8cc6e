//! 产物校验：落盘前的完整性与格式检查
//!
//! 文本要求非空白；二进制要求非空、不超限，且结构上是完整的 PNG 或 JPEG
//! （签名 + 结尾标记都要在，截断的下载件两者缺一）。

use crate::cache::{ArtifactContent, ArtifactKind, CacheError};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// 通过校验时返回检测到的格式（"text" / "png" / "jpeg"）
pub fn validate(
    kind: ArtifactKind,
    content: &ArtifactContent,
    max_binary_bytes: usize,
) -> Result<&'static str, CacheError> {
    match (kind.is_binary(), content) {
        (false, ArtifactContent::Text(text)) => {
            if text.trim().is_empty() {
                return Err(CacheError::Validation("empty text artifact".to_string()));
            }
            Ok("text")
        }
        (true, ArtifactContent::Binary(bytes)) => validate_image(bytes, max_binary_bytes),
        (false, ArtifactContent::Binary(_)) => Err(CacheError::Validation(format!(
            "expected text for kind {}",
            kind.as_str()
        ))),
        (true, ArtifactContent::Text(_)) => Err(CacheError::Validation(format!(
            "expected binary for kind {}",
            kind.as_str()
        ))),
    }
}

fn validate_image(bytes: &[u8], max_bytes: usize) -> Result<&'static str, CacheError> {
    if bytes.is_empty() {
        return Err(CacheError::Validation("empty image artifact".to_string()));
    }
    if bytes.len() > max_bytes {
        return Err(CacheError::Validation(format!(
            "image too large: {} bytes (limit {})",
            bytes.len(),
            max_bytes
        )));
    }

    if bytes.len() > 16 && bytes[..8] == PNG_SIGNATURE {
        // IEND chunk 名在末尾 8 字节的前 4 字节（后 4 字节是 CRC）
        if &bytes[bytes.len() - 8..bytes.len() - 4] == b"IEND" {
            return Ok("png");
        }
        return Err(CacheError::Validation(
            "truncated png: missing IEND chunk".to_string(),
        ));
    }

    if bytes.len() > 4 && bytes[..3] == JPEG_SOI {
        if bytes[bytes.len() - 2..] == JPEG_EOI {
            return Ok("jpeg");
        }
        return Err(CacheError::Validation(
            "truncated jpeg: missing EOI marker".to_string(),
        ));
    }

    Err(CacheError::Validation(
        "unrecognized image format (expected png or jpeg)".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::tiny_png;

    const LIMIT: usize = 1024;

    #[test]
    fn blank_text_is_rejected() {
        let content = ArtifactContent::Text("   \n\t".to_string());
        assert!(validate(ArtifactKind::Exposition, &content, LIMIT).is_err());
        let ok = ArtifactContent::Text("Expanding brackets means...".to_string());
        assert_eq!(
            validate(ArtifactKind::Exposition, &ok, LIMIT).unwrap(),
            "text"
        );
    }

    #[test]
    fn complete_png_passes() {
        let content = ArtifactContent::Binary(tiny_png());
        assert_eq!(
            validate(ArtifactKind::Diagram, &content, LIMIT).unwrap(),
            "png"
        );
    }

    #[test]
    fn truncated_png_is_rejected() {
        let mut bytes = tiny_png();
        bytes.truncate(bytes.len() - 4);
        let content = ArtifactContent::Binary(bytes);
        assert!(validate(ArtifactKind::Diagram, &content, LIMIT).is_err());
    }

    #[test]
    fn jpeg_needs_both_markers() {
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0];
        jpeg.extend_from_slice(&[0u8; 32]);
        let headless = ArtifactContent::Binary(jpeg.clone());
        assert!(validate(ArtifactKind::Diagram, &headless, LIMIT).is_err());

        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        let whole = ArtifactContent::Binary(jpeg);
        assert_eq!(
            validate(ArtifactKind::Diagram, &whole, LIMIT).unwrap(),
            "jpeg"
        );
    }

    #[test]
    fn oversized_image_is_rejected() {
        let png = tiny_png();
        let limit = png.len() - 1;
        let content = ArtifactContent::Binary(png);
        assert!(validate(ArtifactKind::Diagram, &content, limit).is_err());
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let content = ArtifactContent::Binary(vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert!(validate(ArtifactKind::Diagram, &content, LIMIT).is_err());
    }
}
