//! Request bodies, query strings and response shapes, one per endpoint.
//!
//! Identifiers and enum-valued query parameters arrive as strings and are parsed
//! here so a bad value yields `invalid_id` / `invalid_input` rather than a
//! generic rejection.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use matflow_core::{CategoryId, DepotId, MaterielId, UserId};
use matflow_delivery::{DeliveryNote, DeliveryNoteStatus};
use matflow_infra::{
    catalog::MaterialInfo,
    delivery_store::DeliveryNoteFilter,
    validation::{LineAvailability, ValidationOutcome},
    projections::{RequestFilter, RequestView},
};
use matflow_requests::{LineGrant, NewLine, Priority, RequestStatus};
use matflow_stock::{DateRange, MaterialStock};

use crate::app::errors::{ApiError, parse_id};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LineBody {
    pub materiel_id: MaterielId,
    pub quantity: i64,
}

impl From<LineBody> for NewLine {
    fn from(value: LineBody) -> Self {
        NewLine {
            materiel_id: value.materiel_id,
            quantity: value.quantity,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub depot_id: DepotId,
    #[serde(default)]
    pub priority: Priority,
    pub desired_date: Option<NaiveDate>,
    pub comment: Option<String>,
    pub lines: Vec<LineBody>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    Approve,
    Reject,
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequestBody {
    pub decision: DecisionKind,
    /// Overrides for individual lines; ignored on rejection.
    #[serde(default)]
    pub grants: Vec<LineGrant>,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DirectDistributionBody {
    pub depot_id: DepotId,
    pub recipient: UserId,
    pub lines: Vec<LineBody>,
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelNoteBody {
    pub comment: Option<String>,
}

/// Body of `/stock/add` and `/stock/remove`.
#[derive(Debug, Deserialize)]
pub struct ManualAdjustmentBody {
    pub materiel_id: MaterielId,
    pub quantity: i64,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CorrectionBody {
    pub materiel_id: MaterielId,
    pub delta: i64,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterMaterialBody {
    pub depot_id: DepotId,
    pub name: String,
    pub unit: String,
    pub unit_price: u64,
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub stock_minimum: i64,
    #[serde(default)]
    pub initial_stock: i64,
}

// -------------------------
// Query strings
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct RequestListQuery {
    pub status: Option<String>,
    pub depot_id: Option<String>,
    pub requester_id: Option<String>,
}

impl RequestListQuery {
    /// Parsed filter; the depot is resolved separately against the caller's scope.
    pub fn into_filter(self) -> Result<(RequestFilter, Option<DepotId>), ApiError> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<RequestStatus>)
            .transpose()?;
        let depot_id = self.depot_id.as_deref().map(parse_id::<DepotId>).transpose()?;
        let requester = self.requester_id.as_deref().map(parse_id::<UserId>).transpose()?;
        Ok((
            RequestFilter {
                status,
                depot_id: None,
                requester,
            },
            depot_id,
        ))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DeliveryNoteListQuery {
    pub depot_id: Option<String>,
    pub request_id: Option<String>,
    pub status: Option<String>,
}

impl DeliveryNoteListQuery {
    pub fn into_filter(self) -> Result<(DeliveryNoteFilter, Option<DepotId>), ApiError> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<DeliveryNoteStatus>)
            .transpose()?;
        let depot_id = self.depot_id.as_deref().map(parse_id::<DepotId>).transpose()?;
        let request_id = self.request_id.as_deref().map(parse_id).transpose()?;
        Ok((
            DeliveryNoteFilter {
                depot_id: None,
                request_id,
                status,
            },
            depot_id,
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct MovementsQuery {
    pub materiel_id: String,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl MovementsQuery {
    pub fn parse(&self) -> Result<(MaterielId, DateRange), ApiError> {
        let materiel_id = parse_id(&self.materiel_id)?;
        let from = self.from.as_deref().map(parse_timestamp).transpose()?;
        let to = self.to.as_deref().map(parse_timestamp).transpose()?;
        Ok((materiel_id, DateRange::new(from, to)?))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DepotQuery {
    pub depot_id: Option<String>,
}

impl DepotQuery {
    pub fn depot_id(&self) -> Result<Option<DepotId>, ApiError> {
        self.depot_id.as_deref().map(parse_id).transpose()
    }
}

/// RFC 3339 timestamp, or a bare date meaning midnight UTC.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ApiError::invalid_input(format!("'{raw}' is neither an RFC 3339 timestamp nor a date")))
}

// -------------------------
// Response DTOs
// -------------------------

/// A request with the totals computed from its lines.
#[derive(Debug, Serialize)]
pub struct RequestResponse {
    #[serde(flatten)]
    pub request: RequestView,
    pub line_count: usize,
    pub total_requested: i64,
    /// Absent until the request is approved.
    pub total_granted: Option<i64>,
}

impl From<RequestView> for RequestResponse {
    fn from(request: RequestView) -> Self {
        Self {
            line_count: request.line_count(),
            total_requested: request.total_requested(),
            total_granted: request.total_granted(),
            request,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RequestListResponse {
    pub items: Vec<RequestResponse>,
    pub total: usize,
}

impl From<Vec<RequestView>> for RequestListResponse {
    fn from(views: Vec<RequestView>) -> Self {
        Self {
            total: views.len(),
            items: views.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ValidationResponse {
    pub request: RequestResponse,
    /// Advisory stock per granted line; empty for a rejection.
    pub availability: Vec<LineAvailability>,
}

impl From<ValidationOutcome> for ValidationResponse {
    fn from(outcome: ValidationOutcome) -> Self {
        Self {
            request: outcome.request.into(),
            availability: outcome.availability,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeliveryNoteResponse {
    #[serde(flatten)]
    pub note: DeliveryNote,
    pub total_quantity: i64,
    pub total_amount: u64,
}

impl From<DeliveryNote> for DeliveryNoteResponse {
    fn from(note: DeliveryNote) -> Self {
        Self {
            total_quantity: note.total_quantity(),
            total_amount: note.total_amount(),
            note,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeliveryNoteListResponse {
    pub items: Vec<DeliveryNoteResponse>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct MaterialResponse {
    #[serde(flatten)]
    pub info: MaterialInfo,
    pub stock_current: i64,
    pub stock_minimum: i64,
}

impl MaterialResponse {
    pub fn new(info: MaterialInfo, stock: &MaterialStock) -> Self {
        Self {
            info,
            stock_current: stock.stock_current(),
            stock_minimum: stock.stock_minimum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matflow_core::{AggregateId, DocumentKind, DocumentNumber};
    use matflow_requests::{RequestId, RequestLine};

    fn view(lines: &[(i64, Option<i64>)]) -> RequestView {
        RequestView {
            id: RequestId::new(AggregateId::new()),
            depot_id: DepotId::new(),
            numero: DocumentNumber::new(DocumentKind::Request, 1).unwrap(),
            requester: UserId::new(),
            status: RequestStatus::Pending,
            priority: Priority::Normal,
            requested_on: Utc::now(),
            desired_date: None,
            comment: None,
            reviewer: None,
            reviewer_comment: None,
            validated_at: None,
            delivery_note_id: None,
            delivered_at: None,
            lines: lines
                .iter()
                .zip(1..)
                .map(|(&(requested, granted), line_no)| RequestLine {
                    line_no,
                    materiel_id: MaterielId::new(),
                    quantity_requested: requested,
                    quantity_granted: granted,
                })
                .collect(),
            version: 1,
        }
    }

    #[test]
    fn request_json_carries_line_totals() {
        let json = serde_json::to_value(RequestResponse::from(view(&[(12, None)]))).unwrap();
        assert_eq!(json["numero"], "DEM-0001");
        assert_eq!(json["line_count"], 1);
        assert_eq!(json["total_requested"], 12);
        assert!(json["total_granted"].is_null());

        let approved = RequestResponse::from(view(&[(12, Some(8)), (3, Some(3))]));
        let json = serde_json::to_value(approved).unwrap();
        assert_eq!(json["line_count"], 2);
        assert_eq!(json["total_requested"], 15);
        assert_eq!(json["total_granted"], 11);
    }

    #[test]
    fn list_totals_follow_items() {
        let list = RequestListResponse::from(vec![view(&[(2, None)]), view(&[(5, None)])]);
        assert_eq!(list.total, 2);
        assert_eq!(list.items[1].total_requested, 5);
    }

    #[test]
    fn timestamps_accept_dates_and_rfc3339() {
        assert_eq!(
            parse_timestamp("2026-03-01").unwrap().to_rfc3339(),
            "2026-03-01T00:00:00+00:00"
        );
        assert_eq!(
            parse_timestamp("2026-03-01T10:00:00+01:00").unwrap().to_rfc3339(),
            "2026-03-01T09:00:00+00:00"
        );
        assert_eq!(parse_timestamp("yesterday").unwrap_err().code(), "invalid_input");
    }

    #[test]
    fn reversed_range_is_invalid_input() {
        let q = MovementsQuery {
            materiel_id: MaterielId::new().to_string(),
            from: Some("2026-03-02".into()),
            to: Some("2026-03-01".into()),
        };
        assert_eq!(q.parse().unwrap_err().code(), "invalid_input");
    }

    #[test]
    fn unknown_status_is_invalid_input() {
        let q = RequestListQuery {
            status: Some("archived".into()),
            ..Default::default()
        };
        assert_eq!(q.into_filter().unwrap_err().code(), "invalid_input");
    }

    #[test]
    fn validate_body_defaults_to_no_grants() {
        let body: ValidateRequestBody = serde_json::from_str(r#"{"decision":"approve"}"#).unwrap();
        assert_eq!(body.decision, DecisionKind::Approve);
        assert!(body.grants.is_empty());
    }
}
