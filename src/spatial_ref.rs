//! Semantic comparison of coordinate reference system descriptions.
//!
//! Two descriptions are the same when they denote the same CRS. The literal text is
//! never compared: a WKT1 string and the matching `EPSG:` code are equivalent.

use crate::backend::Backend;
use crate::errors::{ConformanceError, Result};

/// Assert that `actual` and `expected` describe the same CRS.
///
/// Both empty succeeds. Exactly one empty fails. Otherwise both are parsed by the
/// backend and compared with its semantic equality.
pub fn check_equivalent<B: Backend + ?Sized>(backend: &B, expected: &str, actual: &str) -> Result<()> {
    let expected = expected.trim();
    let actual = actual.trim();
    match (expected.is_empty(), actual.is_empty()) {
        (true, true) => return Ok(()),
        (false, false) => {}
        _ => return Err(mismatch(expected, actual)),
    }

    let expected_srs = backend.parse_spatial_ref(expected)?;
    let actual_srs = backend.parse_spatial_ref(actual)?;
    if expected_srs != actual_srs {
        log::debug!("{expected_srs:?} != {actual_srs:?}");
        return Err(mismatch(expected, actual));
    }
    Ok(())
}

fn mismatch(expected: &str, actual: &str) -> ConformanceError {
    ConformanceError::ProjectionMismatch {
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

/// Lightweight CRS identity used where no projection engine is linked.
///
/// An authority code wins when one can be found at the top level of the definition
/// (`EPSG:4326`, WKT1 `AUTHORITY["EPSG","4326"]`, WKT2 `ID["EPSG",4326]`); anything
/// else is identified by its text with whitespace removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpatialRefIdentity {
    Authority { name: String, code: String },
    Definition(String),
}

impl SpatialRefIdentity {
    pub fn from_definition(definition: &str) -> Result<Self> {
        let definition = definition.trim();
        if definition.is_empty() {
            return Err(ConformanceError::InvalidSpatialRef {
                definition: definition.to_string(),
                msg: "empty definition".to_string(),
            });
        }

        let upper = definition.to_ascii_uppercase();
        if matches!(upper.as_str(), "WGS84" | "CRS84" | "OGC:CRS84") {
            return Ok(Self::authority("EPSG", "4326"));
        }
        if let Some((name, code)) = upper.split_once(':') {
            let code = code.trim();
            if !name.contains('[') && !code.is_empty() && code.chars().all(|c| c.is_ascii_digit()) {
                return Ok(Self::authority(name.trim(), code));
            }
        }

        if !is_balanced(definition) {
            return Err(ConformanceError::InvalidSpatialRef {
                definition: definition.to_string(),
                msg: "unbalanced brackets".to_string(),
            });
        }
        if let Some((name, code)) = top_level_authority(definition) {
            return Ok(Self::authority(&name, &code));
        }
        Ok(Self::Definition(
            definition.chars().filter(|c| !c.is_whitespace()).collect(),
        ))
    }

    /// The EPSG code, if this CRS is identified by one.
    pub fn epsg(&self) -> Option<u32> {
        match self {
            Self::Authority { name, code } if name == "EPSG" => code.parse().ok(),
            _ => None,
        }
    }

    fn authority(name: &str, code: &str) -> Self {
        Self::Authority {
            name: name.to_ascii_uppercase(),
            code: code.to_string(),
        }
    }
}

fn is_balanced(definition: &str) -> bool {
    let mut depth = 0i32;
    for c in definition.chars() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }
    depth == 0
}

/// Finds `AUTHORITY[...]` or `ID[...]` nested directly under the root node.
fn top_level_authority(wkt: &str) -> Option<(String, String)> {
    let mut depth = 0usize;
    let mut token_start = 0usize;
    for (i, c) in wkt.char_indices() {
        match c {
            '[' | '(' => {
                if depth == 1 {
                    let keyword = wkt[token_start..i].trim().to_ascii_uppercase();
                    if keyword == "AUTHORITY" || keyword == "ID" {
                        return parse_authority_args(&wkt[i + 1..]);
                    }
                }
                depth += 1;
            }
            ']' | ')' => depth = depth.saturating_sub(1),
            ',' => token_start = i + 1,
            _ => {}
        }
        if c == '[' || c == '(' {
            token_start = i + 1;
        }
    }
    None
}

fn parse_authority_args(args: &str) -> Option<(String, String)> {
    let end = args.find([']', ')'])?;
    let mut parts = args[..end]
        .split(',')
        .map(|p| p.trim().trim_matches('"').to_string());
    let name = parts.next()?;
    let code = parts.next()?;
    if name.is_empty() || code.is_empty() {
        return None;
    }
    Some((name, code))
}
