//! CAT frame representation: `;`-terminated ASCII, command code = first two bytes.

/// A single CAT frame, with the terminating `;` stripped from `payload` but
/// present in `raw`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatFrame {
    pub code: String,
    pub payload: String,
    pub raw: String,
}

impl CatFrame {
    /// Parses a complete frame body (without the trailing `;`, already stripped by the reader).
    pub fn parse(body: &str) -> Self {
        let raw = format!("{body};");
        if body.len() >= 2 && body.as_bytes()[0].is_ascii_alphabetic() {
            let (code, payload) = body.split_at(2);
            CatFrame {
                code: code.to_string(),
                payload: payload.to_string(),
                raw,
            }
        } else {
            // `?;` rejection frames and other non-alpha-coded bodies: no command code.
            CatFrame {
                code: String::new(),
                payload: body.to_string(),
                raw,
            }
        }
    }

    pub fn is_reject(&self) -> bool {
        self.raw == "?;"
    }
}

/// Formats a command for the wire: `code + payload + ';'`.
pub fn format_command(code: &str, payload: &str) -> String {
    format!("{code}{payload};")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_code_and_payload() {
        let f = CatFrame::parse("FA014074000");
        assert_eq!(f.code, "FA");
        assert_eq!(f.payload, "014074000");
        assert_eq!(f.raw, "FA014074000;");
    }

    #[test]
    fn reject_frame_has_no_code() {
        let f = CatFrame::parse("?");
        assert!(f.is_reject());
        assert_eq!(f.code, "");
    }

    #[test]
    fn format_command_appends_terminator() {
        assert_eq!(format_command("FA", "014074000"), "FA014074000;");
        assert_eq!(format_command("AI", "1"), "AI1;");
    }
}
