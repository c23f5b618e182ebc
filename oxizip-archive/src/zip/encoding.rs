//! Text encoding for entry names and comments.
//!
//! General purpose flag bit 11 marks a record's name and comment as UTF-8.
//! When it is clear the bytes are in whatever code page the writer used;
//! the reader has to be told which one. The flag is authoritative: there
//! is no sniffing.

use codepage_437::{BorrowFromCp437, CP437_CONTROL, ToCp437};
use encoding_rs::Encoding;
use oxizip_core::error::{OxiZipError, Result};
use std::borrow::Cow;

/// Encoding for names and comments.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TextEncoding {
    /// IBM PC code page 437, the historical ZIP default.
    ///
    /// On write, ASCII text is stored as plain bytes and anything else as
    /// flagged UTF-8.
    #[default]
    Cp437,
    /// Always UTF-8, with the language encoding flag set on write.
    Utf8,
    /// An explicit single- or multi-byte code page. Text that cannot be
    /// represented is an error on write.
    CodePage(&'static Encoding),
}

impl TextEncoding {
    /// Resolve a user-supplied label such as `utf-8`, `437`, `cp1252`,
    /// `932` or `shift_jis`.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        match label.as_str() {
            "utf-8" | "utf8" | "65001" => return Some(Self::Utf8),
            "437" | "cp437" | "ibm437" => return Some(Self::Cp437),
            _ => {}
        }
        let alias = match label.as_str() {
            "932" => "shift_jis",
            "936" => "gbk",
            "949" => "euc-kr",
            "950" => "big5",
            "866" => "ibm866",
            other => other,
        };
        let alias = match alias.parse::<u16>() {
            Ok(page @ 1250..=1258) => format!("windows-{}", page),
            _ => alias.to_string(),
        };
        Encoding::for_label(alias.as_bytes()).map(Self::CodePage)
    }

    /// Encode `text`. Returns the bytes and whether the UTF-8 flag must be
    /// set on the record.
    pub fn encode<'a>(&self, text: &'a str) -> Result<(Cow<'a, [u8]>, bool)> {
        match self {
            Self::Cp437 => Ok((Cow::Borrowed(text.as_bytes()), !text.is_ascii())),
            Self::Utf8 => Ok((Cow::Borrowed(text.as_bytes()), true)),
            Self::CodePage(encoding) => {
                let (bytes, _, had_errors) = encoding.encode(text);
                if had_errors {
                    return Err(OxiZipError::encoding_error(format!(
                        "'{}' is not representable in {}",
                        text,
                        encoding.name()
                    )));
                }
                Ok((bytes, false))
            }
        }
    }

    /// Encode text for a field that has no UTF-8 flag, such as the archive
    /// comment. The result decodes back with `decode(bytes, false)`.
    pub fn encode_unflagged<'a>(&self, text: &'a str) -> Result<Cow<'a, [u8]>> {
        match self {
            Self::Cp437 => {
                let encoded: std::result::Result<Cow<'a, [u8]>, _> = text.to_cp437(&CP437_CONTROL);
                encoded.map_err(|_| {
                    OxiZipError::encoding_error(format!("'{}' is not representable in code page 437", text))
                })
            }
            Self::Utf8 => Ok(Cow::Borrowed(text.as_bytes())),
            Self::CodePage(_) => self.encode(text).map(|(bytes, _)| bytes),
        }
    }

    /// Decode record bytes, honoring the UTF-8 flag.
    pub fn decode(&self, bytes: &[u8], utf8_flag: bool) -> String {
        if utf8_flag {
            return String::from_utf8_lossy(bytes).into_owned();
        }
        match self {
            Self::Cp437 => {
                let text: Cow<'_, str> = Cow::borrow_from_cp437(bytes, &CP437_CONTROL);
                text.into_owned()
            }
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::CodePage(encoding) => encoding.decode_without_bom_handling(bytes).0.into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ascii_is_unflagged() {
        let (bytes, flag) = TextEncoding::default().encode("dir/file.txt").unwrap();
        assert_eq!(&*bytes, b"dir/file.txt");
        assert!(!flag);
    }

    #[test]
    fn test_default_non_ascii_uses_utf8_flag() {
        let (bytes, flag) = TextEncoding::default().encode("résumé.txt").unwrap();
        assert!(flag);
        assert_eq!(TextEncoding::default().decode(&bytes, flag), "résumé.txt");
    }

    #[test]
    fn test_cp437_decoding() {
        // 0x82 is e-acute and 0x9C the pound sign in code page 437.
        assert_eq!(TextEncoding::Cp437.decode(&[0x82, b'a', 0x9C], false), "éa£");
    }

    #[test]
    fn test_flag_is_authoritative() {
        let utf8 = "ü".as_bytes();
        assert_eq!(TextEncoding::Cp437.decode(utf8, true), "ü");
        assert_ne!(TextEncoding::Cp437.decode(utf8, false), "ü");
    }

    #[test]
    fn test_code_page_roundtrip() {
        let encoding = TextEncoding::from_label("932").unwrap();
        let (bytes, flag) = encoding.encode("日本語.txt").unwrap();
        assert!(!flag);
        assert_ne!(&*bytes, "日本語.txt".as_bytes());
        assert_eq!(encoding.decode(&bytes, false), "日本語.txt");
    }

    #[test]
    fn test_unrepresentable_text() {
        let encoding = TextEncoding::from_label("cp1252").unwrap();
        let err = encoding.encode("日本").unwrap_err();
        assert!(matches!(err, OxiZipError::EncodingError { .. }));
    }

    #[test]
    fn test_unflagged_text() {
        let encoding = TextEncoding::Cp437;
        let bytes = encoding.encode_unflagged("café £5").unwrap();
        assert_eq!(&*bytes, &[b'c', b'a', b'f', 0x82, b' ', 0x9C, b'5']);
        assert_eq!(encoding.decode(&bytes, false), "café £5");
        assert!(encoding.encode_unflagged("日本").is_err());
    }

    #[test]
    fn test_labels() {
        assert_eq!(TextEncoding::from_label("UTF-8"), Some(TextEncoding::Utf8));
        assert_eq!(TextEncoding::from_label("437"), Some(TextEncoding::Cp437));
        assert_eq!(
            TextEncoding::from_label("1251"),
            Some(TextEncoding::CodePage(encoding_rs::WINDOWS_1251))
        );
        assert_eq!(TextEncoding::from_label("no-such-page"), None);
    }
}
