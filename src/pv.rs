use crate::PvError;
use log::debug;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A value read from or written to a process variable.
#[derive(Debug, Clone, PartialEq)]
pub enum PvValue {
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<f64>),
}

impl PvValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "an integer",
            Self::Float(_) => "a float",
            Self::Str(_) => "a string",
            Self::Array(_) => "an array",
        }
    }

    /// Integer view. Floats are rounded, strings are parsed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.is_finite() => Some(v.round() as i64),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Str(s) => s.trim().parse().ok(),
            Self::Array(_) => None,
        }
    }

    pub fn as_array(&self) -> Option<&[f64]> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for PvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
            Self::Array(v) => {
                let items: Vec<String> = v.iter().map(|x| x.to_string()).collect();
                write!(f, "[{}]", items.join(" "))
            }
        }
    }
}

impl From<i64> for PvValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for PvValue {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<usize> for PvValue {
    fn from(value: usize) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for PvValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for PvValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for PvValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<f64>> for PvValue {
    fn from(value: Vec<f64>) -> Self {
        Self::Array(value)
    }
}

/// Transport to the control system. Names passed in are full PV names.
pub trait PvClient: Send + Sync {
    fn get(&self, pvname: &str) -> Result<PvValue, PvError>;

    /// Write a value. With `wait` the call returns only once the record has
    /// finished processing.
    fn put(&self, pvname: &str, value: PvValue, wait: bool) -> Result<(), PvError>;

    /// Give the client a chance to process pending monitor updates.
    fn poll(&self) {}
}

/// A group of PVs sharing a prefix, addressed by attribute name.
///
/// Attributes registered at construction (or with [`PvDevice::add_pv`]) map to
/// an explicit PV name; any other attribute resolves to
/// `prefix + delim + attr`.
#[derive(Clone)]
pub struct PvDevice {
    prefix: String,
    delim: String,
    client: Arc<dyn PvClient>,
    pvs: BTreeMap<String, String>,
}

impl fmt::Debug for PvDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PvDevice")
            .field("prefix", &self.prefix)
            .field("delim", &self.delim)
            .field("pvs", &self.pvs.len())
            .finish()
    }
}

impl PvDevice {
    pub fn new(prefix: &str, delim: &str, attrs: &[&str], client: Arc<dyn PvClient>) -> Self {
        let mut device = Self {
            prefix: prefix.to_string(),
            delim: delim.to_string(),
            client,
            pvs: BTreeMap::new(),
        };
        for attr in attrs {
            let pvname = device.default_pv_name(attr);
            device.pvs.insert(attr.to_string(), pvname);
        }
        device
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn client(&self) -> Arc<dyn PvClient> {
        Arc::clone(&self.client)
    }

    fn default_pv_name(&self, attr: &str) -> String {
        format!("{}{}{}", self.prefix, self.delim, attr)
    }

    /// Register `pvname` under `attr`, replacing any previous mapping.
    pub fn add_pv(&mut self, pvname: &str, attr: &str) {
        self.pvs.insert(attr.to_string(), pvname.to_string());
    }

    pub fn has_attr(&self, attr: &str) -> bool {
        self.pvs.contains_key(attr)
    }

    pub fn attrs(&self) -> impl Iterator<Item = &str> {
        self.pvs.keys().map(String::as_str)
    }

    pub fn pv_name(&self, attr: &str) -> String {
        match self.pvs.get(attr) {
            Some(pvname) => pvname.clone(),
            None => self.default_pv_name(attr),
        }
    }

    pub fn get(&self, attr: &str) -> Result<PvValue, PvError> {
        self.client.get(&self.pv_name(attr))
    }

    pub fn get_i64(&self, attr: &str) -> Result<i64, PvError> {
        let pvname = self.pv_name(attr);
        let value = self.client.get(&pvname)?;
        value.as_i64().ok_or(PvError::TypeMismatch {
            pv: pvname,
            expected: "an integer",
            found: value.kind(),
        })
    }

    pub fn get_f64(&self, attr: &str) -> Result<f64, PvError> {
        let pvname = self.pv_name(attr);
        let value = self.client.get(&pvname)?;
        value.as_f64().ok_or(PvError::TypeMismatch {
            pv: pvname,
            expected: "a float",
            found: value.kind(),
        })
    }

    /// String readback of any PV type.
    pub fn get_string(&self, attr: &str) -> Result<String, PvError> {
        Ok(self.get(attr)?.to_string())
    }

    pub fn get_array(&self, attr: &str) -> Result<Vec<f64>, PvError> {
        let pvname = self.pv_name(attr);
        match self.client.get(&pvname)? {
            PvValue::Array(values) => Ok(values),
            other => Err(PvError::TypeMismatch {
                pv: pvname,
                expected: "an array",
                found: other.kind(),
            }),
        }
    }

    pub fn put(&self, attr: &str, value: impl Into<PvValue>) -> Result<(), PvError> {
        self.put_with(attr, value.into(), false)
    }

    pub fn put_wait(&self, attr: &str, value: impl Into<PvValue>) -> Result<(), PvError> {
        self.put_with(attr, value.into(), true)
    }

    pub fn put_with(&self, attr: &str, value: PvValue, wait: bool) -> Result<(), PvError> {
        let pvname = self.pv_name(attr);
        debug!("put {pvname} = {value}");
        self.client.put(&pvname, value, wait)
    }

    pub fn poll(&self) {
        self.client.poll();
    }
}
