use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub font_family: String,
    pub font_size: f32,
    pub node_fill: String,
    pub node_text_color: String,
    pub node_border_color: String,
    pub line_color: String,
    pub group_background: String,
    pub group_border: String,
    pub error_color: String,
    pub background: String,
}

impl Theme {
    pub fn classic() -> Self {
        Self {
            font_family: "\"trebuchet ms\", verdana, arial, sans-serif".to_string(),
            font_size: 14.0,
            node_fill: "#ECECFF".to_string(),
            node_text_color: "#333333".to_string(),
            node_border_color: "#9370DB".to_string(),
            line_color: "#333333".to_string(),
            group_background: "#FFFFDE".to_string(),
            group_border: "#AAAA33".to_string(),
            error_color: "#552222".to_string(),
            background: "#FFFFFF".to_string(),
        }
    }

    pub fn modern() -> Self {
        Self {
            font_family: "Inter, Segoe UI, system-ui, -apple-system, sans-serif".to_string(),
            font_size: 13.0,
            node_fill: "#F8FAFF".to_string(),
            node_text_color: "#1C2430".to_string(),
            node_border_color: "#C7D2E5".to_string(),
            line_color: "#7A8AA6".to_string(),
            group_background: "#F7FAFF".to_string(),
            group_border: "#D7E0F0".to_string(),
            error_color: "#B42318".to_string(),
            background: "#FFFFFF".to_string(),
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "modern" => Some(Self::modern()),
            "classic" | "default" | "base" => Some(Self::classic()),
            _ => None,
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::modern()
    }
}

/// Parses `#rgb`, `#rrggbb` or `#rrggbbaa` into straight RGBA bytes.
pub fn parse_hex_rgba(input: &str) -> Option<[u8; 4]> {
    let hex = input.trim().strip_prefix('#')?;
    let nibble = |idx: usize| u8::from_str_radix(hex.get(idx..idx + 1)?, 16).ok();
    let byte = |idx: usize| u8::from_str_radix(hex.get(idx..idx + 2)?, 16).ok();
    match hex.len() {
        3 => Some([nibble(0)? * 17, nibble(1)? * 17, nibble(2)? * 17, 255]),
        6 => Some([byte(0)?, byte(2)?, byte(4)?, 255]),
        8 => Some([byte(0)?, byte(2)?, byte(4)?, byte(6)?]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_colors() {
        assert_eq!(parse_hex_rgba("#fff"), Some([255, 255, 255, 255]));
        assert_eq!(parse_hex_rgba("#1C2430"), Some([0x1C, 0x24, 0x30, 255]));
        assert_eq!(parse_hex_rgba("#00000080"), Some([0, 0, 0, 0x80]));
        assert_eq!(parse_hex_rgba("red"), None);
        assert_eq!(parse_hex_rgba("#12345"), None);
    }
}
