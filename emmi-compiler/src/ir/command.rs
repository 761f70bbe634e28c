//! Hardware command catalog.
//!
//! Every token the firmware understands as a bare statement lives here. Adding a
//! command means adding a variant and its row in [`Command::token`]; the
//! compiler then points at every match that needs updating.

use std::fmt;

use super::ast::InitFlag;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    EyeRedOn,
    EyeRedOff,
    EyeGreenOn,
    EyeGreenOff,
    EyeBlueOn,
    EyeBlueOff,
    EyeAllOn,
    EyeAllOff,
    MotorForward,
    MotorBackward,
    MotorLeft,
    MotorRight,
    MotorStop,
    BuzzerStop,
    /// `BF<hz>`
    Tone(u32),
    /// `BP<name>`
    Melody(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EyeColor {
    Red,
    Green,
    Blue,
    All,
}

/// Commands without parameters, in catalog order.
pub static SIMPLE_COMMANDS: [Command; 14] = [
    Command::EyeRedOn,
    Command::EyeRedOff,
    Command::EyeGreenOn,
    Command::EyeGreenOff,
    Command::EyeBlueOn,
    Command::EyeBlueOff,
    Command::EyeAllOn,
    Command::EyeAllOff,
    Command::MotorForward,
    Command::MotorBackward,
    Command::MotorLeft,
    Command::MotorRight,
    Command::MotorStop,
    Command::BuzzerStop,
];

const MAX_TONE_HZ: u32 = 20_000;
const MAX_MELODY_NAME: usize = 32;

impl Command {
    pub fn token(&self) -> String {
        let simple = match self {
            Self::EyeRedOn => "ERN",
            Self::EyeRedOff => "ERF",
            Self::EyeGreenOn => "EGN",
            Self::EyeGreenOff => "EGF",
            Self::EyeBlueOn => "EBN",
            Self::EyeBlueOff => "EBF",
            Self::EyeAllOn => "EAN",
            Self::EyeAllOff => "EAF",
            Self::MotorForward => "MF",
            Self::MotorBackward => "MB",
            Self::MotorLeft => "ML",
            Self::MotorRight => "MR",
            Self::MotorStop => "MS",
            Self::BuzzerStop => "BS",
            Self::Tone(hz) => return format!("BF{}", hz),
            Self::Melody(name) => return format!("BP{}", name),
        };
        simple.to_string()
    }

    pub fn description(&self) -> String {
        match self {
            Self::EyeRedOn => "red eyes on".to_string(),
            Self::EyeRedOff => "red eyes off".to_string(),
            Self::EyeGreenOn => "green eyes on".to_string(),
            Self::EyeGreenOff => "green eyes off".to_string(),
            Self::EyeBlueOn => "blue eyes on".to_string(),
            Self::EyeBlueOff => "blue eyes off".to_string(),
            Self::EyeAllOn => "all eyes on".to_string(),
            Self::EyeAllOff => "all eyes off".to_string(),
            Self::MotorForward => "drive forward".to_string(),
            Self::MotorBackward => "drive backward".to_string(),
            Self::MotorLeft => "turn left".to_string(),
            Self::MotorRight => "turn right".to_string(),
            Self::MotorStop => "stop motors".to_string(),
            Self::BuzzerStop => "buzzer off".to_string(),
            Self::Tone(hz) => format!("buzzer tone at {} Hz", hz),
            Self::Melody(name) => format!("play melody {}", name),
        }
    }

    /// Subsystem that has to be initialized before this command runs.
    pub fn init_flag(&self) -> InitFlag {
        match self {
            Self::EyeRedOn
            | Self::EyeRedOff
            | Self::EyeGreenOn
            | Self::EyeGreenOff
            | Self::EyeBlueOn
            | Self::EyeBlueOff
            | Self::EyeAllOn
            | Self::EyeAllOff => InitFlag::Eyes,
            Self::MotorForward
            | Self::MotorBackward
            | Self::MotorLeft
            | Self::MotorRight
            | Self::MotorStop => InitFlag::Motors,
            Self::BuzzerStop | Self::Tone(_) | Self::Melody(_) => InitFlag::Buzzer,
        }
    }

    /// Parses a command token. Case-sensitive; callers normalize first.
    pub fn parse(token: &str) -> Option<Self> {
        if let Some(found) = SIMPLE_COMMANDS.iter().find(|c| c.token() == token) {
            return Some(found.clone());
        }
        if let Some(digits) = token.strip_prefix("BF") {
            if !digits.is_empty() && digits.len() <= 5 && digits.chars().all(|c| c.is_ascii_digit()) {
                let hz: u32 = digits.parse().ok()?;
                if hz <= MAX_TONE_HZ {
                    return Some(Self::Tone(hz));
                }
            }
            return None;
        }
        if let Some(name) = token.strip_prefix("BP") {
            let valid = !name.is_empty()
                && name.len() <= MAX_MELODY_NAME
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            return valid.then(|| Self::Melody(name.to_string()));
        }
        None
    }

    pub fn eye(color: EyeColor, on: bool) -> Self {
        match (color, on) {
            (EyeColor::Red, true) => Self::EyeRedOn,
            (EyeColor::Red, false) => Self::EyeRedOff,
            (EyeColor::Green, true) => Self::EyeGreenOn,
            (EyeColor::Green, false) => Self::EyeGreenOff,
            (EyeColor::Blue, true) => Self::EyeBlueOn,
            (EyeColor::Blue, false) => Self::EyeBlueOff,
            (EyeColor::All, true) => Self::EyeAllOn,
            (EyeColor::All, false) => Self::EyeAllOff,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_tokens_parse_back() {
        for command in SIMPLE_COMMANDS.iter() {
            assert_eq!(Command::parse(&command.token()).as_ref(), Some(command));
        }
    }

    #[test]
    fn parameterized_buzzer_tokens() {
        assert_eq!(Command::parse("BF440"), Some(Command::Tone(440)));
        assert_eq!(Command::parse("BPStarWars"), Some(Command::Melody("StarWars".into())));
        assert_eq!(Command::parse("BF"), None);
        assert_eq!(Command::parse("BF99999"), None);
        assert_eq!(Command::parse("BP a|b"), None);
        assert_eq!(Command::parse("XYZ"), None);
    }

    #[test]
    fn flags_follow_subsystem() {
        assert_eq!(Command::EyeAllOff.init_flag(), InitFlag::Eyes);
        assert_eq!(Command::MotorStop.init_flag(), InitFlag::Motors);
        assert_eq!(Command::Tone(440).init_flag(), InitFlag::Buzzer);
    }
}
