use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Serialize, Serializer};

use super::command::Command;

/// Storage slots available per variable type.
pub const MAX_SLOTS: u8 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub init_flags: InitFlags,
    pub setup: Vec<Statement>,
    #[serde(rename = "loop")]
    pub loop_body: Vec<Statement>,
}

impl Program {
    /// Program with no statements and no flags, serializes to `|I||S||L||`.
    pub fn empty() -> Self {
        Self {
            init_flags: InitFlags::default(),
            setup: Vec::new(),
            loop_body: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Statement {
    /// ERN, MF, BS ...
    #[serde(rename = "cmd")]
    Command { cmd: Command },
    /// D500
    Delay { ms: u64 },
    /// G(I,1,=,0)
    SetVar {
        #[serde(rename = "varType")]
        var_type: VarType,
        index: u8,
        op: AssignOp,
        value: Value,
    },
    /// C(expr){then}{else}
    If {
        #[serde(rename = "expr")]
        condition: Condition,
        #[serde(rename = "then")]
        then_branch: Vec<Statement>,
        #[serde(rename = "else")]
        else_branch: Vec<Statement>,
    },
    /// W(expr){body}
    While {
        #[serde(rename = "expr")]
        condition: Condition,
        body: Vec<Statement>,
    },
    /// F(start-end,step){body}
    For {
        start: i64,
        end: i64,
        step: i64,
        body: Vec<Statement>,
    },
    /// K(value, (match){body} ... (D){default})
    Switch {
        value: Value,
        cases: Vec<SwitchCase>,
        default: Vec<Statement>,
    },
    /// X
    Break,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchCase {
    #[serde(rename = "match")]
    pub matches: Value,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Boolean(bool),
    Variable(VarRef),
    Sensor(Sensor),
    Text(String),
    Binary {
        op: ArithOp,
        left: Box<Value>,
        right: Box<Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub op: Comparator,
    pub left: Value,
    pub right: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VarType {
    Int,
    Float,
    Char,
    Str,
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarRef {
    pub var_type: VarType,
    pub slot: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    Touch,
    Mic,
    Light,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,      // +
    Subtract, // -
    Multiply, // *
    Divide,   // /
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,       // =
    Increment, // +
}

/// Hardware subsystem that must be brought up before `setup` runs.
///
/// Variant order is the emission order of the `|I|` section.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InitFlag {
    Eyes,
    Buzzer,
    Motors,
    Touch,
    Mic,
    Light,
    /// Wireless serial link advertised under a device name.
    Wireless(String),
}

/// Insertion-ordered set of init flags.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InitFlags(Vec<InitFlag>);

impl VarType {
    pub const ALL: [VarType; 5] = [Self::Int, Self::Float, Self::Char, Self::Str, Self::Bool];

    pub fn letter(self) -> char {
        match self {
            Self::Int => 'I',
            Self::Float => 'F',
            Self::Char => 'C',
            Self::Str => 'S',
            Self::Bool => 'B',
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.letter() == letter)
    }

    /// Maps the editor's declared type names; unknown names are ints.
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "int" | "long" => Self::Int,
            "float" => Self::Float,
            "char" => Self::Char,
            "String" => Self::Str,
            "boolean" => Self::Bool,
            _ => Self::Int,
        }
    }

    pub fn type_name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Char => "char",
            Self::Str => "String",
            Self::Bool => "boolean",
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl Serialize for VarType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl VarRef {
    pub fn new(var_type: VarType, slot: u8) -> Option<Self> {
        (1..=MAX_SLOTS).contains(&slot).then_some(Self { var_type, slot })
    }

    /// `I1` .. `B5`
    pub fn parse(token: &str) -> Option<Self> {
        let mut chars = token.chars();
        let var_type = VarType::from_letter(chars.next()?)?;
        let digit = chars.next()?.to_digit(10)?;
        if chars.next().is_some() {
            return None;
        }
        Self::new(var_type, digit as u8)
    }
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.var_type.letter(), self.slot)
    }
}

impl Sensor {
    pub fn token(self) -> &'static str {
        match self {
            Self::Touch => "TR",
            Self::Mic => "AR",
            Self::Light => "VR",
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "TR" => Some(Self::Touch),
            "AR" => Some(Self::Mic),
            "VR" => Some(Self::Light),
            _ => None,
        }
    }

    pub fn init_flag(self) -> InitFlag {
        match self {
            Self::Touch => InitFlag::Touch,
            Self::Mic => InitFlag::Mic,
            Self::Light => InitFlag::Light,
        }
    }
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
        }
    }

    pub fn parse(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(Self::Add),
            "-" => Some(Self::Subtract),
            "*" => Some(Self::Multiply),
            "/" => Some(Self::Divide),
            _ => None,
        }
    }
}

impl Comparator {
    pub const ALL: [Comparator; 6] = [
        Self::Equal,
        Self::NotEqual,
        Self::Greater,
        Self::GreaterEqual,
        Self::Less,
        Self::LessEqual,
    ];

    /// Symbol used in the AST exchange format.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Less => "<",
            Self::LessEqual => "<=",
        }
    }

    /// Symbol used inside `O<op>,..` expressions; equality is a bare `=`.
    pub fn script_symbol(self) -> &'static str {
        match self {
            Self::Equal => "=",
            other => other.symbol(),
        }
    }

    pub fn parse(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.symbol() == symbol)
    }

    /// Logical negation within the six-comparator set.
    pub fn invert(self) -> Self {
        match self {
            Self::Equal => Self::NotEqual,
            Self::NotEqual => Self::Equal,
            Self::Greater => Self::LessEqual,
            Self::LessEqual => Self::Greater,
            Self::GreaterEqual => Self::Less,
            Self::Less => Self::GreaterEqual,
        }
    }
}

impl Serialize for Comparator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.symbol())
    }
}

impl Condition {
    pub fn new(op: Comparator, left: Value, right: Value) -> Self {
        Self { op, left, right }
    }

    pub fn inverted(&self) -> Self {
        Self {
            op: self.op.invert(),
            left: self.left.clone(),
            right: self.right.clone(),
        }
    }
}

impl AssignOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Set => "=",
            Self::Increment => "+",
        }
    }
}

impl Serialize for AssignOp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.symbol())
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.token())
    }
}

fn numeric_token() -> &'static Regex {
    static NUMERIC: OnceLock<Regex> = OnceLock::new();
    NUMERIC.get_or_init(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("numeric token pattern"))
}

pub fn is_numeric_token(token: &str) -> bool {
    numeric_token().is_match(token)
}

/// Prints integral values without a fractional part (`2000`, not `2000.0`).
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

impl Value {
    /// Classifies a loose string token from the exchange format.
    pub fn from_token(token: &str) -> Self {
        if is_numeric_token(token) {
            if let Ok(n) = token.parse::<f64>() {
                return Self::Number(n);
            }
        }
        if let Some(var) = VarRef::parse(token) {
            return Self::Variable(var);
        }
        if let Some(sensor) = Sensor::parse(token) {
            return Self::Sensor(sensor);
        }
        if let Some(inner) = strip_matching_quotes(token) {
            return Self::Text(inner.to_string());
        }
        Self::Text(token.to_string())
    }

    pub fn number(n: impl Into<f64>) -> Self {
        Self::Number(n.into())
    }
}

fn strip_matching_quotes(token: &str) -> Option<&str> {
    for quote in ['"', '\''] {
        if token.len() >= 2 && token.starts_with(quote) && token.ends_with(quote) {
            return Some(&token[1..token.len() - 1]);
        }
    }
    None
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        match self {
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => serializer.serialize_i64(*n as i64),
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::Variable(var) => serializer.collect_str(var),
            Self::Sensor(sensor) => serializer.serialize_str(sensor.token()),
            Self::Text(text) => {
                // Text that would read back as another kind of value keeps quotes.
                if Value::from_token(text) == Value::Text(text.clone()) {
                    serializer.serialize_str(text)
                } else {
                    serializer.serialize_str(&format!("\"{}\"", text))
                }
            }
            Self::Binary { op, left, right } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("op", op.symbol())?;
                map.serialize_entry("left", left)?;
                map.serialize_entry("right", right)?;
                map.end()
            }
        }
    }
}

/// Backslash and double-quote escaping shared by every quoted literal.
pub fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn unescape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

impl InitFlag {
    pub fn code(&self) -> String {
        match self {
            Self::Eyes => "E".to_string(),
            Self::Buzzer => "B".to_string(),
            Self::Motors => "M".to_string(),
            Self::Touch => "T".to_string(),
            Self::Mic => "A".to_string(),
            Self::Light => "V".to_string(),
            Self::Wireless(name) => format!("R\"{}\"", escape_text(name)),
        }
    }

    /// Ordering priority for the `|I|` section; custom flags share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Eyes => 0,
            Self::Buzzer => 1,
            Self::Motors => 2,
            Self::Touch => 3,
            Self::Mic => 4,
            Self::Light => 5,
            Self::Wireless(_) => 6,
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "E" => Some(Self::Eyes),
            "B" => Some(Self::Buzzer),
            "M" => Some(Self::Motors),
            "T" => Some(Self::Touch),
            "A" => Some(Self::Mic),
            "V" => Some(Self::Light),
            _ => Self::parse_wireless(code),
        }
    }

    /// `R"<name>"`
    pub fn parse_wireless(code: &str) -> Option<Self> {
        let inner = code.strip_prefix("R\"")?.strip_suffix('"')?;
        Some(Self::Wireless(unescape_text(inner)))
    }
}

impl InitFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a flag unless already present. Returns whether it was new.
    pub fn insert(&mut self, flag: InitFlag) -> bool {
        if self.0.contains(&flag) {
            return false;
        }
        self.0.push(flag);
        true
    }

    pub fn contains(&self, flag: &InitFlag) -> bool {
        self.0.contains(flag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &InitFlag> {
        self.0.iter()
    }

    /// Emission order: `E,B,M,T,A,V`, then custom flags as inserted.
    pub fn ordered(&self) -> Vec<&InitFlag> {
        let mut flags: Vec<&InitFlag> = self.0.iter().collect();
        flags.sort_by_key(|flag| flag.rank());
        flags
    }
}

impl FromIterator<InitFlag> for InitFlags {
    fn from_iter<T: IntoIterator<Item = InitFlag>>(iter: T) -> Self {
        let mut flags = Self::new();
        for flag in iter {
            flags.insert(flag);
        }
        flags
    }
}

impl Serialize for InitFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.ordered().into_iter().map(|flag| flag.code()))
    }
}
