//! Field-map file loading
//!
//! The on-disk format is a single header line of nine whitespace-separated
//! values, `nx ny nz x_begin y_begin z_begin dx dy dz`, followed by
//! `nx*ny*nz` lines of three field components in Gauss, x-major (x outer,
//! then y, then z). Components are stored scaled to the kG/10 convention
//! used by the lookup path.
//!
//! Map paths are configuration values and may carry environment-style
//! references (`~`, `$VAR`, `${VAR}`), expanded before the file is opened.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::grid::field_map::{FieldMap, FieldMapError, GridGeometry};

/// Gauss to kG/10 storage convention: every raw file value is scaled by 10
const FIELD_SCALE: f32 = 10.0;

/// Expand `~` and `$VAR` / `${VAR}` references in a field-map path.
///
/// Unset variables expand to the empty string, matching shell behavior for
/// startup configuration paths.
#[must_use]
pub fn expand_path(path: &str) -> PathBuf {
    let expanded = expand_vars(path);
    let expanded = if expanded == "~" {
        env::var("HOME").unwrap_or(expanded)
    } else if let Some(tail) = expanded.strip_prefix("~/") {
        match env::var("HOME") {
            Ok(home) => format!("{home}/{tail}"),
            Err(_) => expanded,
        }
    } else {
        expanded
    };
    PathBuf::from(expanded)
}

fn expand_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                // Unterminated brace: leave the text as-is
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                .unwrap_or(after.len());
            (&after[..end], end)
        };
        if name.is_empty() {
            out.push('$');
            rest = after;
        } else {
            if let Ok(value) = env::var(name) {
                out.push_str(&value);
            }
            rest = &after[consumed..];
        }
    }
    out.push_str(rest);
    out
}

fn next_header_token<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    field: &'static str,
) -> Result<&'a str, FieldMapError> {
    tokens
        .next()
        .ok_or_else(|| FieldMapError::MalformedHeader(format!("missing value for {field}")))
}

fn parse_count(token: &str, field: &'static str) -> Result<usize, FieldMapError> {
    let value: usize = token.parse().map_err(|_| {
        FieldMapError::MalformedHeader(format!("{field}: expected an integer, got {token:?}"))
    })?;
    if value == 0 {
        return Err(FieldMapError::MalformedHeader(format!(
            "{field} must be positive"
        )));
    }
    Ok(value)
}

fn parse_float(token: &str, field: &'static str) -> Result<f32, FieldMapError> {
    token.parse().map_err(|_| {
        FieldMapError::MalformedHeader(format!("{field}: expected a number, got {token:?}"))
    })
}

fn parse_spacing(token: &str, field: &'static str) -> Result<f32, FieldMapError> {
    let value = parse_float(token, field)?;
    if value <= 0.0 || !value.is_finite() {
        return Err(FieldMapError::MalformedHeader(format!(
            "{field} must be a positive spacing, got {value}"
        )));
    }
    Ok(value)
}

fn parse_header<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
) -> Result<GridGeometry, FieldMapError> {
    let nx = parse_count(next_header_token(tokens, "nx")?, "nx")?;
    let ny = parse_count(next_header_token(tokens, "ny")?, "ny")?;
    let nz = parse_count(next_header_token(tokens, "nz")?, "nz")?;
    let x_begin = parse_float(next_header_token(tokens, "x_begin")?, "x_begin")?;
    let y_begin = parse_float(next_header_token(tokens, "y_begin")?, "y_begin")?;
    let z_begin = parse_float(next_header_token(tokens, "z_begin")?, "z_begin")?;
    let dx = parse_spacing(next_header_token(tokens, "dx")?, "dx")?;
    let dy = parse_spacing(next_header_token(tokens, "dy")?, "dy")?;
    let dz = parse_spacing(next_header_token(tokens, "dz")?, "dz")?;

    // Reject headers whose node count cannot even be addressed
    nx.checked_mul(ny)
        .and_then(|v| v.checked_mul(nz))
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| {
            FieldMapError::MalformedHeader(format!(
                "grid dimensions {nx}x{ny}x{nz} overflow the sample buffer"
            ))
        })?;

    Ok(GridGeometry {
        nx,
        ny,
        nz,
        x_begin,
        y_begin,
        z_begin,
        dx,
        dy,
        dz,
    })
}

impl FieldMap {
    /// Load a field map from a text file.
    ///
    /// `path` may contain `~` and `$VAR` references, which are expanded
    /// before the file is opened. The whole grid must parse; there is no
    /// partial-load recovery.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, or if its content does
    /// not form a complete nine-value header plus `nx*ny*nz` sample
    /// triplets.
    pub fn load(name: &str, path: &str) -> Result<Self, FieldMapError> {
        let resolved = expand_path(path);
        info!("reading field map {name} from {}", resolved.display());

        let contents = fs::read_to_string(&resolved)
            .map_err(|e| FieldMapError::Io(format!("{}: {e}", resolved.display())))?;

        Self::parse(name, &resolved, &contents)
    }

    /// Read a field map at startup, aborting on any failure.
    ///
    /// The field map is required for any subsequent simulation; a missing
    /// or unparseable file is a misconfiguration that cannot be resolved at
    /// runtime, so there is no recoverable error path here.
    ///
    /// # Panics
    ///
    /// Panics (after logging a diagnostic) if the file cannot be opened or
    /// parsed. Use [`FieldMap::load`] for a recoverable variant.
    #[must_use]
    pub fn read(name: &str, path: &str) -> Self {
        match Self::load(name, path) {
            Ok(map) => map,
            Err(e) => {
                error!("field map {name} from {path}: {e}");
                panic!("cannot read field map {name} from {path}: {e}");
            }
        }
    }

    fn parse(name: &str, path: &Path, contents: &str) -> Result<Self, FieldMapError> {
        let mut tokens = contents.split_whitespace();
        let geometry = parse_header(&mut tokens)?;

        let expected = geometry.sample_count();
        let mut samples = Vec::with_capacity(geometry.buffer_len());
        for cell in 0..expected {
            for component in ["bx", "by", "bz"] {
                let token = tokens.next().ok_or(FieldMapError::Truncated {
                    expected,
                    read: cell,
                })?;
                let value: f32 = token.parse().map_err(|_| FieldMapError::BadSample {
                    cell,
                    component,
                    token: token.to_string(),
                })?;
                samples.push(FIELD_SCALE * value);
            }
        }

        Ok(FieldMap::from_parts(
            name.to_string(),
            path.display().to_string(),
            geometry,
            samples,
        ))
    }
}
