use ratatui::style::{Color, Modifier, Style};

/// The sixteen chat palette colours, indexed by their legacy code digit.
const PALETTE: [(&str, char, Color); 16] = [
    ("black", '0', Color::Rgb(0x00, 0x00, 0x00)),
    ("dark_blue", '1', Color::Rgb(0x00, 0x00, 0xAA)),
    ("dark_green", '2', Color::Rgb(0x00, 0xAA, 0x00)),
    ("dark_aqua", '3', Color::Rgb(0x00, 0xAA, 0xAA)),
    ("dark_red", '4', Color::Rgb(0xAA, 0x00, 0x00)),
    ("dark_purple", '5', Color::Rgb(0xAA, 0x00, 0xAA)),
    ("gold", '6', Color::Rgb(0xFF, 0xAA, 0x00)),
    ("gray", '7', Color::Rgb(0xAA, 0xAA, 0xAA)),
    ("dark_gray", '8', Color::Rgb(0x55, 0x55, 0x55)),
    ("blue", '9', Color::Rgb(0x55, 0x55, 0xFF)),
    ("green", 'a', Color::Rgb(0x55, 0xFF, 0x55)),
    ("aqua", 'b', Color::Rgb(0x55, 0xFF, 0xFF)),
    ("red", 'c', Color::Rgb(0xFF, 0x55, 0x55)),
    ("light_purple", 'd', Color::Rgb(0xFF, 0x55, 0xFF)),
    ("yellow", 'e', Color::Rgb(0xFF, 0xFF, 0x55)),
    ("white", 'f', Color::Rgb(0xFF, 0xFF, 0xFF)),
];

/// Parse a user-supplied colour.
///
/// Accepts `#rgb`, `#rrggbb`, `rgb(r,g,b)`, chat palette names (`gold`,
/// `dark_aqua`, ...) and the terminal names ratatui knows about.
pub fn parse_color(input: &str) -> Option<Color> {
    let lower = input.trim().to_ascii_lowercase();
    if lower.is_empty() {
        return None;
    }
    if let Some(color) = parse_hex_color(&lower) {
        return Some(color);
    }
    if let Some(color) = parse_rgb_func(&lower) {
        return Some(color);
    }

    let name = lower.replace(['-', ' '], "_");
    if let Some((_, _, color)) = PALETTE.iter().find(|(n, _, _)| *n == name) {
        return Some(*color);
    }
    match name.as_str() {
        "grey" => palette_color('7'),
        "dark_grey" | "darkgray" | "darkgrey" => palette_color('8'),
        "cyan" => Some(Color::Cyan),
        "light_cyan" => Some(Color::LightCyan),
        "magenta" | "purple" => Some(Color::Magenta),
        "light_magenta" => Some(Color::LightMagenta),
        "light_red" => Some(Color::LightRed),
        "light_green" => Some(Color::LightGreen),
        "light_blue" => Some(Color::LightBlue),
        "light_yellow" => Some(Color::LightYellow),
        "reset" => Some(Color::Reset),
        _ => None,
    }
}

fn parse_hex_color(s: &str) -> Option<Color> {
    let hex = s.strip_prefix('#')?;
    if !hex.is_ascii() {
        return None;
    }
    if hex.len() == 3 {
        let r = u8::from_str_radix(&hex[0..1].repeat(2), 16).ok()?;
        let g = u8::from_str_radix(&hex[1..2].repeat(2), 16).ok()?;
        let b = u8::from_str_radix(&hex[2..3].repeat(2), 16).ok()?;
        Some(Color::Rgb(r, g, b))
    } else if hex.len() == 6 {
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Color::Rgb(r, g, b))
    } else {
        None
    }
}

fn parse_rgb_func(s: &str) -> Option<Color> {
    let content = s.strip_prefix("rgb(")?.strip_suffix(')')?;
    let parts: Vec<_> = content
        .split([',', ' '])
        .filter(|t| !t.is_empty())
        .collect();
    if parts.len() != 3 {
        return None;
    }
    let r = parts[0].parse::<u16>().ok()?;
    let g = parts[1].parse::<u16>().ok()?;
    let b = parts[2].parse::<u16>().ok()?;
    Some(Color::Rgb(
        r.min(255) as u8,
        g.min(255) as u8,
        b.min(255) as u8,
    ))
}

fn palette_color(code: char) -> Option<Color> {
    PALETTE
        .iter()
        .find(|(_, c, _)| *c == code)
        .map(|(_, _, color)| *color)
}

/// Effect of a legacy formatting code (the character after `§` or `&`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyCode {
    Color(Color),
    Modifier(Modifier),
    Obfuscated,
    Reset,
}

impl LegacyCode {
    pub fn from_char(code: char) -> Option<Self> {
        if let Some(color) = palette_color(code) {
            return Some(LegacyCode::Color(color));
        }
        match code {
            'k' => Some(LegacyCode::Obfuscated),
            'l' => Some(LegacyCode::Modifier(Modifier::BOLD)),
            'm' => Some(LegacyCode::Modifier(Modifier::CROSSED_OUT)),
            'n' => Some(LegacyCode::Modifier(Modifier::UNDERLINED)),
            'o' => Some(LegacyCode::Modifier(Modifier::ITALIC)),
            'r' => Some(LegacyCode::Reset),
            _ => None,
        }
    }

    /// A colour code also clears any active modifiers.
    pub fn apply(self, style: Style) -> Style {
        match self {
            LegacyCode::Color(color) => Style::default().fg(color),
            LegacyCode::Modifier(modifier) => style.add_modifier(modifier),
            LegacyCode::Obfuscated => style,
            LegacyCode::Reset => Style::default(),
        }
    }
}

/// Remove `§x` codes from a string, e.g. to recover a bare player name.
pub fn strip_legacy_codes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '§' {
            if let Some(&next) = chars.peek() {
                if LegacyCode::from_char(next).is_some() {
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_palette_names_and_aliases() {
        assert_eq!(parse_color("gold"), Some(Color::Rgb(0xFF, 0xAA, 0x00)));
        assert_eq!(parse_color("Dark-Aqua"), Some(Color::Rgb(0x00, 0xAA, 0xAA)));
        assert_eq!(parse_color("grey"), parse_color("gray"));
        assert_eq!(parse_color("cyan"), Some(Color::Cyan));
    }

    #[test]
    fn parses_hex_and_rgb_forms() {
        assert_eq!(parse_color("#fa0"), Some(Color::Rgb(0xFF, 0xAA, 0x00)));
        assert_eq!(parse_color("#102030"), Some(Color::Rgb(0x10, 0x20, 0x30)));
        assert_eq!(parse_color("rgb(300, 5, 6)"), Some(Color::Rgb(255, 5, 6)));
        assert_eq!(parse_color("#12"), None);
        assert_eq!(parse_color("rgb(1,2)"), None);
    }

    #[test]
    fn rejects_unknown_names() {
        assert_eq!(parse_color("sparkly"), None);
        assert_eq!(parse_color("   "), None);
    }

    #[test]
    fn legacy_color_code_clears_modifiers() {
        let bold = LegacyCode::from_char('l').unwrap().apply(Style::default());
        assert!(bold.add_modifier.contains(Modifier::BOLD));

        let red = LegacyCode::from_char('c').unwrap().apply(bold);
        assert_eq!(red, Style::default().fg(Color::Rgb(0xFF, 0x55, 0x55)));
        assert_eq!(LegacyCode::from_char('z'), None);
    }

    #[test]
    fn strips_codes_but_keeps_lone_section_signs() {
        assert_eq!(strip_legacy_codes("§aSte§lve§r"), "Steve");
        assert_eq!(strip_legacy_codes("50§"), "50§");
        assert_eq!(strip_legacy_codes("§zx"), "§zx");
    }
}
