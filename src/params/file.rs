//! Tab-separated parameter file parsing.
//!
//! The format is the one QGroundControl exports:
//!
//! ```text
//! # Onboard parameters for Vehicle 1
//! #
//! # Version 2
//! #
//! # Vehicle-Id Component-Id Name Value Type
//! 1	1	MPC_Z_P	4.0	9
//! ```
//!
//! Remote sources are fetched upstream; only local paths are read here.

use std::collections::HashSet;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, instrument, trace, warn};

use super::filter::ParamFilter;
use super::{Component, ParamType, ParamValue, Parameter, ParameterSpec, SpecVersion};
use crate::error::{Result, SyncError};

/// A parsed parameter file: one version and a spec per component.
#[derive(Debug, Clone)]
pub struct ParamFile {
    pub version: SpecVersion,
    components: Vec<(Component, ParameterSpec)>,
}

impl ParamFile {
    /// Components in the order they first appear in the file.
    pub fn components(&self) -> impl Iterator<Item = &(Component, ParameterSpec)> {
        self.components.iter()
    }

    #[must_use]
    pub fn component_ids(&self) -> Vec<Component> {
        self.components.iter().map(|(c, _)| *c).collect()
    }

    /// Number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Total number of parameters across all components.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.components.iter().map(|(_, s)| s.len()).sum()
    }

    /// The file restricted to one component, or the whole file for `None`.
    pub fn narrow(&self, component: Option<Component>) -> Result<Self> {
        let Some(wanted) = component else {
            return Ok(self.clone());
        };
        let (component, spec) = self.select(Some(wanted))?;
        Ok(Self {
            version: self.version.clone(),
            components: vec![(component, spec.clone())],
        })
    }

    /// Every component with excluded parameters removed.
    #[must_use]
    pub fn filtered(&self, filter: &ParamFilter) -> Self {
        Self {
            version: self.version.clone(),
            components: self
                .components
                .iter()
                .map(|(c, spec)| (*c, filter.apply(spec)))
                .collect(),
        }
    }

    /// SHA-256 identifying the desired sets of all components.
    ///
    /// A single-component file has the digest of its only spec.
    #[must_use]
    pub fn digest(&self) -> String {
        if let [(_, spec)] = self.components.as_slice() {
            return spec.digest();
        }
        let mut hasher = Sha256::new();
        for (component, spec) in &self.components {
            hasher.update(format!("{component}\t{}\n", spec.digest()).as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Pick the desired set for a component.
    ///
    /// Without an explicit choice the file must describe exactly one
    /// component.
    pub fn select(&self, component: Option<Component>) -> Result<(Component, &ParameterSpec)> {
        let available = || {
            self.components
                .iter()
                .map(|(c, _)| c.to_string())
                .collect::<Vec<_>>()
        };

        match component {
            Some(wanted) => self
                .components
                .iter()
                .find(|(c, _)| *c == wanted)
                .map(|(c, s)| (*c, s))
                .ok_or_else(|| SyncError::ComponentNotFound {
                    component: wanted.to_string(),
                    available: available(),
                }),
            None => match self.components.as_slice() {
                [(c, s)] => Ok((*c, s)),
                [] => Err(SyncError::ParamFileParse {
                    line: 0,
                    reason: "file contains no parameters".to_string(),
                }),
                _ => Err(SyncError::ComponentNotFound {
                    component: "<unspecified>".to_string(),
                    available: available(),
                }),
            },
        }
    }
}

/// Read and parse a parameter file from a local path.
#[instrument(skip_all, fields(source = %source))]
pub fn read_param_file(source: &str) -> Result<ParamFile> {
    if source.starts_with("https://") || source.starts_with("http://") {
        return Err(SyncError::RemoteParamFile {
            url: source.to_string(),
        });
    }

    let path = Path::new(source);
    if !path.exists() {
        return Err(SyncError::ParamFileNotFound {
            path: source.to_string(),
        });
    }

    let text = std::fs::read_to_string(path)?;
    let file = parse_param_file(&text)?;
    debug!(
        version = %file.version,
        components = file.components.len(),
        params = file.param_count(),
        "Parameter file loaded"
    );
    Ok(file)
}

/// Parse parameter file text.
pub fn parse_param_file(text: &str) -> Result<ParamFile> {
    let mut version: Option<SpecVersion> = None;
    let mut grouped: Vec<(Component, Vec<Parameter>)> = Vec::new();
    let mut seen: HashSet<(Component, String)> = HashSet::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();

        if line.is_empty() {
            continue;
        }

        if let Some(comment) = line.strip_prefix('#') {
            if comment.contains("Version") {
                if let Some(token) = comment.split_whitespace().last() {
                    trace!(line = line_no, token, "Version header");
                    version = Some(SpecVersion::new(token));
                }
            }
            continue;
        }

        let (component, param) = parse_data_line(line, line_no)?;
        if !seen.insert((component, param.name.clone())) {
            return Err(SyncError::ParamFileParse {
                line: line_no,
                reason: format!("duplicate parameter {} for component {component}", param.name),
            });
        }

        match grouped.iter_mut().find(|(c, _)| *c == component) {
            Some((_, params)) => params.push(param),
            None => grouped.push((component, vec![param])),
        }
    }

    let version = version.unwrap_or_else(|| {
        warn!("Parameter file has no Version header, every sync will run and none is recorded");
        SpecVersion::new("")
    });

    let components = grouped
        .into_iter()
        .map(|(component, params)| {
            ParameterSpec::from_params(version.clone(), params).map(|spec| (component, spec))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ParamFile {
        version,
        components,
    })
}

fn parse_data_line(line: &str, line_no: usize) -> Result<(Component, Parameter)> {
    let err = |reason: String| SyncError::ParamFileParse {
        line: line_no,
        reason,
    };

    let fields: Vec<&str> = line.split_whitespace().collect();
    let [vehicle, component, name, value, tag] = fields.as_slice() else {
        return Err(err(format!(
            "expected 5 fields (vehicle, component, name, value, type), found {}",
            fields.len()
        )));
    };

    let vehicle_id: u8 = vehicle
        .parse()
        .map_err(|_| err(format!("invalid vehicle id '{vehicle}'")))?;
    let component_id: u8 = component
        .parse()
        .map_err(|_| err(format!("invalid component id '{component}'")))?;
    let param_type = tag
        .parse::<u8>()
        .ok()
        .and_then(ParamType::from_tag)
        .ok_or_else(|| err(format!("unknown type tag '{tag}'")))?;
    let value = ParamValue::parse(value, param_type).map_err(|e| err(e.to_string()))?;

    Ok((
        Component::new(vehicle_id, component_id),
        Parameter::new(*name, value),
    ))
}
