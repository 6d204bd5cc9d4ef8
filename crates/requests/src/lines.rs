use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use matflow_core::{DomainError, DomainResult, MaterielId};

/// A line as submitted by the requester (or by a direct distribution).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLine {
    pub materiel_id: MaterielId,
    pub quantity: i64,
}

/// Request line: materiel, requested quantity and, after approval, granted quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLine {
    pub line_no: u32,
    pub materiel_id: MaterielId,
    pub quantity_requested: i64,
    /// `None` until the request is approved.
    pub quantity_granted: Option<i64>,
}

/// Reviewer override for one line, keyed by materiel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineGrant {
    pub materiel_id: MaterielId,
    pub quantity_granted: i64,
}

/// Granted quantity decided for one line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantedLine {
    pub line_no: u32,
    pub quantity_granted: i64,
}

/// Check a submitted line set: non-empty, positive quantities, one line per materiel.
pub fn validate_new_lines(lines: &[NewLine]) -> DomainResult<()> {
    if lines.is_empty() {
        return Err(DomainError::invalid_input("at least one line is required"));
    }

    let mut seen = HashSet::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        if line.quantity <= 0 {
            return Err(DomainError::invalid_input(format!(
                "line {}: quantity must be positive",
                idx + 1
            )));
        }
        if !seen.insert(line.materiel_id) {
            return Err(DomainError::invalid_input(format!(
                "line {}: materiel {} is already on this request",
                idx + 1,
                line.materiel_id
            )));
        }
    }
    Ok(())
}

/// Decide the granted quantity of every line.
///
/// Lines without an override are granted in full. Every grant must name a line of the
/// request, appear once, and stay within `0..=requested`. At least one line must be
/// granted a positive quantity.
pub fn resolve_grants(lines: &[RequestLine], grants: &[LineGrant]) -> DomainResult<Vec<GrantedLine>> {
    let mut overrides: HashMap<MaterielId, i64> = HashMap::with_capacity(grants.len());
    for g in grants {
        if overrides.insert(g.materiel_id, g.quantity_granted).is_some() {
            return Err(DomainError::invalid_grant(format!(
                "materiel {} is granted more than once",
                g.materiel_id
            )));
        }
    }

    let mut decided = Vec::with_capacity(lines.len());
    for line in lines {
        let granted = overrides
            .remove(&line.materiel_id)
            .unwrap_or(line.quantity_requested);

        if granted < 0 || granted > line.quantity_requested {
            return Err(DomainError::invalid_grant(format!(
                "line {}: granted {granted} is outside 0..={}",
                line.line_no, line.quantity_requested
            )));
        }

        decided.push(GrantedLine {
            line_no: line.line_no,
            quantity_granted: granted,
        });
    }

    if let Some(unknown) = overrides.keys().next() {
        return Err(DomainError::invalid_grant(format!(
            "materiel {unknown} is not on this request"
        )));
    }

    if decided.iter().all(|g| g.quantity_granted == 0) {
        return Err(DomainError::invalid_grant(
            "every line is granted zero; reject the request instead",
        ));
    }

    Ok(decided)
}
