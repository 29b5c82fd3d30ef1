//! Symbolic key tokens (`"ctrl+a"`, `"Page_Down"`, `"Return"`) and their CDP
//! key-event definitions.

use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Modifier {
    Alt,
    Control,
    Meta,
    Shift,
}

impl Modifier {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "ctrl" | "control" | "ctl" => Some(Modifier::Control),
            "alt" | "option" => Some(Modifier::Alt),
            "shift" => Some(Modifier::Shift),
            "super" | "command" | "cmd" | "meta" | "win" => Some(Modifier::Meta),
            _ => None,
        }
    }

    /// Bit used in the `modifiers` field of `Input.dispatchKeyEvent`.
    pub fn cdp_bit(&self) -> i64 {
        match self {
            Modifier::Alt => 1,
            Modifier::Control => 2,
            Modifier::Meta => 4,
            Modifier::Shift => 8,
        }
    }

    pub fn definition(&self) -> KeyDefinition {
        let (key, code, key_code) = match self {
            Modifier::Alt => ("Alt", "AltLeft", 18),
            Modifier::Control => ("Control", "ControlLeft", 17),
            Modifier::Meta => ("Meta", "MetaLeft", 91),
            Modifier::Shift => ("Shift", "ShiftLeft", 16),
        };
        KeyDefinition::new(key, code, key_code, None)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum NamedKey {
    Enter,
    Tab,
    Escape,
    Space,
    Backspace,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    ArrowLeft,
    ArrowUp,
    ArrowRight,
    ArrowDown,
    /// `F1` through `F12`.
    Function(u8),
    /// Keypad digits `0` through `9`.
    Numpad(u8),
    NumpadAdd,
    NumpadSubtract,
    NumpadMultiply,
    NumpadDivide,
    NumpadDecimal,
    NumpadEnter,
}

impl NamedKey {
    /// Looks up a lower-cased token with `_` and `-` removed.
    fn from_normalized(token: &str) -> Option<Self> {
        let key = match token {
            "return" | "enter" => NamedKey::Enter,
            "tab" => NamedKey::Tab,
            "escape" | "esc" => NamedKey::Escape,
            "space" => NamedKey::Space,
            "backspace" => NamedKey::Backspace,
            "delete" | "del" => NamedKey::Delete,
            "insert" => NamedKey::Insert,
            "home" => NamedKey::Home,
            "end" => NamedKey::End,
            "pageup" | "prior" => NamedKey::PageUp,
            "pagedown" | "next" => NamedKey::PageDown,
            "left" | "arrowleft" => NamedKey::ArrowLeft,
            "up" | "arrowup" => NamedKey::ArrowUp,
            "right" | "arrowright" => NamedKey::ArrowRight,
            "down" | "arrowdown" => NamedKey::ArrowDown,
            "kpadd" | "kpplus" => NamedKey::NumpadAdd,
            "kpsubtract" | "kpminus" => NamedKey::NumpadSubtract,
            "kpmultiply" => NamedKey::NumpadMultiply,
            "kpdivide" => NamedKey::NumpadDivide,
            "kpdecimal" => NamedKey::NumpadDecimal,
            "kpenter" => NamedKey::NumpadEnter,
            other => {
                if let Some(n) = other.strip_prefix("kp").and_then(|d| d.parse::<u8>().ok()) {
                    if n <= 9 {
                        return Some(NamedKey::Numpad(n));
                    }
                    return None;
                }
                if let Some(n) = other.strip_prefix('f').and_then(|d| d.parse::<u8>().ok()) {
                    if (1..=12).contains(&n) {
                        return Some(NamedKey::Function(n));
                    }
                }
                return None;
            }
        };
        Some(key)
    }

    pub fn definition(&self) -> KeyDefinition {
        match self {
            NamedKey::Enter => KeyDefinition::new("Enter", "Enter", 13, Some("\r")),
            NamedKey::Tab => KeyDefinition::new("Tab", "Tab", 9, Some("\t")),
            NamedKey::Escape => KeyDefinition::new("Escape", "Escape", 27, None),
            NamedKey::Space => KeyDefinition::new(" ", "Space", 32, Some(" ")),
            NamedKey::Backspace => KeyDefinition::new("Backspace", "Backspace", 8, None),
            NamedKey::Delete => KeyDefinition::new("Delete", "Delete", 46, None),
            NamedKey::Insert => KeyDefinition::new("Insert", "Insert", 45, None),
            NamedKey::Home => KeyDefinition::new("Home", "Home", 36, None),
            NamedKey::End => KeyDefinition::new("End", "End", 35, None),
            NamedKey::PageUp => KeyDefinition::new("PageUp", "PageUp", 33, None),
            NamedKey::PageDown => KeyDefinition::new("PageDown", "PageDown", 34, None),
            NamedKey::ArrowLeft => KeyDefinition::new("ArrowLeft", "ArrowLeft", 37, None),
            NamedKey::ArrowUp => KeyDefinition::new("ArrowUp", "ArrowUp", 38, None),
            NamedKey::ArrowRight => KeyDefinition::new("ArrowRight", "ArrowRight", 39, None),
            NamedKey::ArrowDown => KeyDefinition::new("ArrowDown", "ArrowDown", 40, None),
            NamedKey::Function(n) => {
                let name = format!("F{n}");
                KeyDefinition::new(&name, &name, 111 + u32::from(*n), None)
            }
            NamedKey::Numpad(n) => {
                let digit = n.to_string();
                KeyDefinition::new(
                    &digit,
                    &format!("Numpad{n}"),
                    96 + u32::from(*n),
                    Some(&digit),
                )
            }
            NamedKey::NumpadAdd => KeyDefinition::new("+", "NumpadAdd", 107, Some("+")),
            NamedKey::NumpadSubtract => KeyDefinition::new("-", "NumpadSubtract", 109, Some("-")),
            NamedKey::NumpadMultiply => KeyDefinition::new("*", "NumpadMultiply", 106, Some("*")),
            NamedKey::NumpadDivide => KeyDefinition::new("/", "NumpadDivide", 111, Some("/")),
            NamedKey::NumpadDecimal => KeyDefinition::new(".", "NumpadDecimal", 110, Some(".")),
            NamedKey::NumpadEnter => KeyDefinition::new("Enter", "NumpadEnter", 13, Some("\r")),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Key {
    Named(NamedKey),
    Char(char),
}

impl Key {
    pub fn definition(&self) -> KeyDefinition {
        match self {
            Key::Named(named) => named.definition(),
            Key::Char(c) => {
                let key = c.to_string();
                let upper = c.to_ascii_uppercase();
                let (code, key_code) = if c.is_ascii_alphabetic() {
                    (format!("Key{upper}"), u32::from(upper))
                } else if c.is_ascii_digit() {
                    (format!("Digit{c}"), u32::from(*c))
                } else {
                    (String::new(), 0)
                };
                KeyDefinition::new(&key, &code, key_code, Some(&key))
            }
        }
    }
}

/// Fields needed for a `keyDown`/`keyUp` pair.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyDefinition {
    pub key: String,
    pub code: String,
    pub key_code: u32,
    pub text: Option<String>,
}

impl KeyDefinition {
    fn new(key: &str, code: &str, key_code: u32, text: Option<&str>) -> Self {
        Self {
            key: key.to_string(),
            code: code.to_string(),
            key_code,
            text: text.map(str::to_string),
        }
    }
}

/// Modifiers held for the duration of the chord, then keys pressed in order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct KeyChord {
    pub modifiers: Vec<Modifier>,
    pub keys: Vec<Key>,
}

impl KeyChord {
    /// Parses one `+`-joined token such as `ctrl+shift+t`.
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        let mut chord = KeyChord::default();
        if token == "+" {
            chord.keys.push(Key::Char('+'));
            return chord;
        }

        for part in token.split('+').filter(|part| !part.is_empty()) {
            let lowered = part.to_ascii_lowercase();
            if let Some(modifier) = Modifier::from_token(&lowered) {
                if !chord.modifiers.contains(&modifier) {
                    chord.modifiers.push(modifier);
                }
                continue;
            }
            let normalized: String = lowered.chars().filter(|c| *c != '_' && *c != '-').collect();
            match NamedKey::from_normalized(&normalized) {
                Some(named) => chord.keys.push(Key::Named(named)),
                None => chord.keys.extend(part.chars().map(Key::Char)),
            }
        }

        if token.ends_with("++") {
            chord.keys.push(Key::Char('+'));
        }
        chord
    }

    /// Parses whitespace-separated chords, e.g. `"ctrl+a Delete"`.
    pub fn parse_sequence(input: &str) -> Vec<Self> {
        input.split_whitespace().map(Self::parse).collect()
    }

    /// Literal text with no modifiers and no named keys.
    pub fn text(text: &str) -> Self {
        Self {
            modifiers: Vec::new(),
            keys: text.chars().map(Key::Char).collect(),
        }
    }

    pub fn modifier_mask(&self) -> i64 {
        self.modifiers.iter().fold(0, |mask, m| mask | m.cdp_bit())
    }

    /// True when the chord can be delivered as an `Input.insertText`.
    pub fn is_plain_text(&self) -> bool {
        self.modifiers.is_empty()
            && !self.keys.is_empty()
            && self.keys.iter().all(|key| matches!(key, Key::Char(_)))
    }

    pub fn plain_text(&self) -> String {
        self.keys
            .iter()
            .filter_map(|key| match key {
                Key::Char(c) => Some(*c),
                Key::Named(_) => None,
            })
            .collect()
    }

    /// Modifiers in the order they must be released.
    pub fn release_order(&self) -> impl Iterator<Item = &Modifier> {
        self.modifiers.iter().rev()
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self
            .modifiers
            .iter()
            .map(|m| m.definition().key)
            .collect();
        parts.extend(self.keys.iter().map(|k| k.definition().key));
        f.write_str(&parts.join("+"))
    }
}
