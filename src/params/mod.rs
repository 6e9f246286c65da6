//! Typed parameter model shared by parameter files, devices and the engine.
//!
//! Type tags follow MAVLink `MAV_PARAM_TYPE`, which is also what the
//! tab-separated parameter files use in their last column.

pub mod file;
pub mod filter;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{Result, SyncError};

pub use file::{ParamFile, parse_param_file, read_param_file};
pub use filter::ParamFilter;

/// Parameter type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Uint64,
    Int64,
    Real32,
    Real64,
}

impl ParamType {
    /// Look up a type by its numeric MAVLink tag.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Uint8),
            2 => Some(Self::Int8),
            3 => Some(Self::Uint16),
            4 => Some(Self::Int16),
            5 => Some(Self::Uint32),
            6 => Some(Self::Int32),
            7 => Some(Self::Uint64),
            8 => Some(Self::Int64),
            9 => Some(Self::Real32),
            10 => Some(Self::Real64),
            _ => None,
        }
    }

    /// Numeric MAVLink tag.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Uint8 => 1,
            Self::Int8 => 2,
            Self::Uint16 => 3,
            Self::Int16 => 4,
            Self::Uint32 => 5,
            Self::Int32 => 6,
            Self::Uint64 => 7,
            Self::Int64 => 8,
            Self::Real32 => 9,
            Self::Real64 => 10,
        }
    }

    #[must_use]
    pub const fn is_real(self) -> bool {
        matches!(self, Self::Real32 | Self::Real64)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uint8 => "UINT8",
            Self::Int8 => "INT8",
            Self::Uint16 => "UINT16",
            Self::Int16 => "INT16",
            Self::Uint32 => "UINT32",
            Self::Int32 => "INT32",
            Self::Uint64 => "UINT64",
            Self::Int64 => "INT64",
            Self::Real32 => "REAL32",
            Self::Real64 => "REAL64",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameter value in its declared width.
///
/// Equality is the exact equality of the native type, so a `Real32` value
/// compares at `f32` precision, which is how the device stores it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Uint8(u8),
    Int8(i8),
    Uint16(u16),
    Int16(i16),
    Uint32(u32),
    Int32(i32),
    Uint64(u64),
    Int64(i64),
    Real32(f32),
    Real64(f64),
}

impl ParamValue {
    #[must_use]
    pub const fn param_type(&self) -> ParamType {
        match self {
            Self::Uint8(_) => ParamType::Uint8,
            Self::Int8(_) => ParamType::Int8,
            Self::Uint16(_) => ParamType::Uint16,
            Self::Int16(_) => ParamType::Int16,
            Self::Uint32(_) => ParamType::Uint32,
            Self::Int32(_) => ParamType::Int32,
            Self::Uint64(_) => ParamType::Uint64,
            Self::Int64(_) => ParamType::Int64,
            Self::Real32(_) => ParamType::Real32,
            Self::Real64(_) => ParamType::Real64,
        }
    }

    /// Parse a textual value for the given declared type.
    ///
    /// Integer types accept integral decimals such as `"1.0"`; real types
    /// reject NaN and infinities.
    #[allow(clippy::cast_possible_truncation)]
    pub fn parse(text: &str, param_type: ParamType) -> Result<Self> {
        let text = text.trim();
        let invalid = |reason: &str| SyncError::InvalidValue {
            value: text.to_string(),
            param_type: param_type.to_string(),
            reason: reason.to_string(),
        };

        if param_type.is_real() {
            let v: f64 = text.parse().map_err(|_| invalid("not a number"))?;
            if !v.is_finite() {
                return Err(invalid("value must be finite"));
            }
            return match param_type {
                ParamType::Real32 => {
                    let narrowed = v as f32;
                    if narrowed.is_finite() {
                        Ok(Self::Real32(narrowed))
                    } else {
                        Err(invalid("out of range for REAL32"))
                    }
                }
                _ => Ok(Self::Real64(v)),
            };
        }

        let wide: i128 = match text.parse::<i128>() {
            Ok(v) => v,
            Err(_) => {
                let v: f64 = text.parse().map_err(|_| invalid("not an integer"))?;
                if !v.is_finite() || v.fract() != 0.0 {
                    return Err(invalid("not an integer"));
                }
                v as i128
            }
        };
        Self::from_integer(wide, param_type).ok_or_else(|| invalid("out of range"))
    }

    fn from_integer(v: i128, param_type: ParamType) -> Option<Self> {
        Some(match param_type {
            ParamType::Uint8 => Self::Uint8(u8::try_from(v).ok()?),
            ParamType::Int8 => Self::Int8(i8::try_from(v).ok()?),
            ParamType::Uint16 => Self::Uint16(u16::try_from(v).ok()?),
            ParamType::Int16 => Self::Int16(i16::try_from(v).ok()?),
            ParamType::Uint32 => Self::Uint32(u32::try_from(v).ok()?),
            ParamType::Int32 => Self::Int32(i32::try_from(v).ok()?),
            ParamType::Uint64 => Self::Uint64(u64::try_from(v).ok()?),
            ParamType::Int64 => Self::Int64(i64::try_from(v).ok()?),
            ParamType::Real32 | ParamType::Real64 => return None,
        })
    }

    /// Numeric value widened to `f64` (lossy for very large 64-bit integers).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Uint8(v) => f64::from(v),
            Self::Int8(v) => f64::from(v),
            Self::Uint16(v) => f64::from(v),
            Self::Int16(v) => f64::from(v),
            Self::Uint32(v) => f64::from(v),
            Self::Int32(v) => f64::from(v),
            Self::Uint64(v) => v as f64,
            Self::Int64(v) => v as f64,
            Self::Real32(v) => f64::from(v),
            Self::Real64(v) => v,
        }
    }

    /// Returns true for any non-zero value.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        self.as_f64() != 0.0
    }

    /// Compare two values of the same type, allowing a relative tolerance for
    /// reals. Integers always compare exactly.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, rel_tolerance: f64) -> bool {
        if self.param_type() != other.param_type() {
            return false;
        }
        if !self.param_type().is_real() || self == other {
            return self == other;
        }
        let (a, b) = (self.as_f64(), other.as_f64());
        (a - b).abs() <= rel_tolerance * a.abs().max(b.abs())
    }

    fn to_numeric(self) -> Numeric {
        match self {
            Self::Uint8(v) => Numeric::Int(i64::from(v)),
            Self::Int8(v) => Numeric::Int(i64::from(v)),
            Self::Uint16(v) => Numeric::Int(i64::from(v)),
            Self::Int16(v) => Numeric::Int(i64::from(v)),
            Self::Uint32(v) => Numeric::Int(i64::from(v)),
            Self::Int32(v) => Numeric::Int(i64::from(v)),
            Self::Uint64(v) => i64::try_from(v).map_or(Numeric::Uint(v), Numeric::Int),
            Self::Int64(v) => Numeric::Int(v),
            // Shortest decimal that round-trips through f32.
            Self::Real32(v) => Numeric::Real(v.to_string().parse().unwrap_or(f64::from(v))),
            Self::Real64(v) => Numeric::Real(v),
        }
    }

    fn from_numeric(n: Numeric, param_type: ParamType) -> Result<Self> {
        let text = match n {
            Numeric::Int(v) => v.to_string(),
            Numeric::Uint(v) => v.to_string(),
            Numeric::Real(v) => v.to_string(),
        };
        Self::parse(&text, param_type)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint8(v) => write!(f, "{v}"),
            Self::Int8(v) => write!(f, "{v}"),
            Self::Uint16(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::Uint32(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Uint64(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Real32(v) => write!(f, "{v:?}"),
            Self::Real64(v) => write!(f, "{v:?}"),
        }
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_numeric().serialize(serializer)
    }
}

/// Untagged number used on the wire of JSON documents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
enum Numeric {
    Int(i64),
    Uint(u64),
    Real(f64),
}

/// A named, typed parameter value.
///
/// Used both for desired entries in a [`ParameterSpec`] and for live values
/// read from the device; the type tag is carried by the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ParameterRepr", try_from = "ParameterRepr")]
pub struct Parameter {
    pub name: String,
    pub value: ParamValue,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: ParamValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    #[must_use]
    pub const fn param_type(&self) -> ParamType {
        self.value.param_type()
    }
}

#[derive(Serialize, Deserialize)]
struct ParameterRepr {
    name: String,
    #[serde(rename = "type")]
    param_type: ParamType,
    value: Numeric,
}

impl From<Parameter> for ParameterRepr {
    fn from(p: Parameter) -> Self {
        Self {
            param_type: p.value.param_type(),
            value: p.value.to_numeric(),
            name: p.name,
        }
    }
}

impl TryFrom<ParameterRepr> for Parameter {
    type Error = SyncError;

    fn try_from(repr: ParameterRepr) -> Result<Self> {
        Ok(Self {
            value: ParamValue::from_numeric(repr.value, repr.param_type)?,
            name: repr.name,
        })
    }
}

/// Live parameter state keyed by name.
pub type LiveParams = BTreeMap<String, Parameter>;

/// Build a [`LiveParams`] map from an iterator of parameters.
pub fn live_params<I: IntoIterator<Item = Parameter>>(params: I) -> LiveParams {
    params.into_iter().map(|p| (p.name.clone(), p)).collect()
}

/// Revision token declared in a parameter file header.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecVersion(String);

impl SpecVersion {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<unversioned>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for SpecVersion {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Vehicle/component address of a parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Component {
    pub vehicle_id: u8,
    pub component_id: u8,
}

impl Component {
    #[must_use]
    pub const fn new(vehicle_id: u8, component_id: u8) -> Self {
        Self {
            vehicle_id,
            component_id,
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.vehicle_id, self.component_id)
    }
}

impl FromStr for Component {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (vehicle, component) = s
            .split_once(':')
            .ok_or_else(|| format!("expected VEHICLE:COMPONENT, got '{s}'"))?;
        let vehicle_id = vehicle
            .trim()
            .parse()
            .map_err(|_| format!("invalid vehicle id '{vehicle}'"))?;
        let component_id = component
            .trim()
            .parse()
            .map_err(|_| format!("invalid component id '{component}'"))?;
        Ok(Self::new(vehicle_id, component_id))
    }
}

/// Desired parameter set for one component, in declared order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    version: SpecVersion,
    params: Vec<Parameter>,
    index: HashMap<String, usize>,
}

impl ParameterSpec {
    /// Create an empty spec.
    #[must_use]
    pub fn new(version: SpecVersion) -> Self {
        Self {
            version,
            params: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Build a spec from parameters; names must be unique.
    pub fn from_params<I>(version: SpecVersion, params: I) -> Result<Self>
    where
        I: IntoIterator<Item = Parameter>,
    {
        let mut spec = Self::new(version);
        for param in params {
            spec.push(param)?;
        }
        Ok(spec)
    }

    /// Append a parameter, rejecting duplicate names.
    pub fn push(&mut self, param: Parameter) -> Result<()> {
        if self.index.contains_key(&param.name) {
            return Err(SyncError::DuplicateParameter {
                name: param.name,
                component: "-".to_string(),
            });
        }
        self.index.insert(param.name.clone(), self.params.len());
        self.params.push(param);
        Ok(())
    }

    #[must_use]
    pub const fn version(&self) -> &SpecVersion {
        &self.version
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.index.get(name).map(|&i| &self.params[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Keep only the parameters for which `keep` returns true.
    #[must_use]
    pub fn filtered<F: Fn(&Parameter) -> bool>(&self, keep: F) -> Self {
        let mut out = Self::new(self.version.clone());
        for param in self.params.iter().filter(|p| keep(p)) {
            out.index.insert(param.name.clone(), out.params.len());
            out.params.push(param.clone());
        }
        out
    }

    /// SHA-256 over the canonical text of the desired set, hex encoded.
    #[must_use]
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.version.as_str().as_bytes());
        hasher.update(b"\n");
        for p in &self.params {
            hasher.update(format!("{}\t{}\t{}\n", p.name, p.value, p.param_type().tag()).as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}
