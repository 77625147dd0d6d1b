//! Typed decoders from store documents to domain records.
//!
//! Every decoder returns `Result<_, ParseError>` for a single document so a
//! malformed document can be dropped without aborting its batch.

use serde_json::Value;

use crate::constants::*;
use crate::document::Document;
use crate::entities::{FormDescriptor, FormEntry, MessageRecord, UnitRecord, User, UserEntry};
use crate::enums::MessageFolder;
use crate::error::ParseError;
use crate::identity::{GroupId, UnixSeconds, VehicleId};

fn missing(doc: &Document, field: &str) -> ParseError {
    ParseError::MissingField {
        path: doc.path.to_string(),
        field: field.to_string(),
    }
}

fn invalid(doc: &Document, field: &str, reason: impl Into<String>) -> ParseError {
    ParseError::InvalidField {
        path: doc.path.to_string(),
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Whole floats that fit in an `i64`. `i64::MAX as f64` rounds up to 2^63,
/// so the upper bound is exclusive.
fn whole_f64_to_i64(f: f64) -> Option<i64> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Integers arrive either as JSON numbers or numeric strings.
fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(whole_f64_to_i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Flags arrive as booleans or 0/1 integers.
fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        other => as_i64(other).map(|n| n != 0),
    }
}

pub fn require_i64(doc: &Document, field: &str) -> Result<i64, ParseError> {
    let value = doc.get(field).ok_or_else(|| missing(doc, field))?;
    as_i64(value).ok_or_else(|| invalid(doc, field, format!("expected integer, got {value}")))
}

pub fn optional_i64(doc: &Document, field: &str) -> Result<Option<i64>, ParseError> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => as_i64(value)
            .map(Some)
            .ok_or_else(|| invalid(doc, field, format!("expected integer, got {value}"))),
    }
}

/// Missing flags read as `false`.
pub fn flag(doc: &Document, field: &str) -> Result<bool, ParseError> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(false),
        Some(value) => {
            as_flag(value).ok_or_else(|| invalid(doc, field, format!("expected flag, got {value}")))
        }
    }
}

pub fn require_str(doc: &Document, field: &str) -> Result<String, ParseError> {
    match doc.get(field) {
        None | Some(Value::Null) => Err(missing(doc, field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(invalid(doc, field, format!("expected string, got {other}"))),
    }
}

fn optional_str(doc: &Document, field: &str) -> String {
    match doc.get(field) {
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

pub fn decode_unit(doc: &Document) -> Result<UnitRecord, ParseError> {
    Ok(UnitRecord {
        vehicle_id: VehicleId(require_i64(doc, FIELD_UNIT_VEHICLE_ID)?),
        customer_id: require_str(doc, FIELD_UNIT_CUSTOMER_ID)?,
    })
}

/// Group ids flagged `true` in a membership document's `gid` map.
pub fn decode_membership(doc: &Document) -> Result<Vec<GroupId>, ParseError> {
    let map = match doc.get(FIELD_MEMBERSHIP_GROUPS) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(invalid(
                doc,
                FIELD_MEMBERSHIP_GROUPS,
                format!("expected map, got {other}"),
            ))
        }
    };

    let mut groups = Vec::with_capacity(map.len());
    for (key, member) in map {
        if !as_flag(member).unwrap_or(false) {
            continue;
        }
        let id = key.trim().parse::<i64>().map_err(|_| {
            invalid(
                doc,
                FIELD_MEMBERSHIP_GROUPS,
                format!("group key {key:?} is not numeric"),
            )
        })?;
        groups.push(GroupId(id));
    }
    Ok(groups)
}

pub fn decode_form(doc: &Document) -> Result<FormEntry, ParseError> {
    Ok(FormEntry {
        descriptor: FormDescriptor {
            form_id: require_i64(doc, FIELD_FORM_ID)?,
            form_class: optional_i64(doc, FIELD_FORM_CLASS)?.unwrap_or(0),
            name: optional_str(doc, FIELD_FORM_NAME),
        },
        in_use_bits: optional_i64(doc, FIELD_FORM_IN_USE_BITS)?.unwrap_or(0),
        driver_originated: optional_i64(doc, FIELD_FORM_DRIVER_ORIGINATED)?.unwrap_or(0),
    })
}

pub fn decode_user(doc: &Document) -> Result<UserEntry, ParseError> {
    Ok(UserEntry {
        user: User {
            id: require_str(doc, FIELD_USER_ID)?,
            username: optional_str(doc, FIELD_USER_NAME),
            email: optional_str(doc, FIELD_USER_EMAIL),
            active: flag(doc, FIELD_USER_ACTIVE)?,
        },
        address_book_eligible: flag(doc, FIELD_USER_ADDRESS_BOOK)?,
    })
}

/// Marker value in seconds; a missing document or field reads as zero.
pub fn decode_marker(doc: Option<&Document>) -> Result<UnixSeconds, ParseError> {
    match doc {
        None => Ok(0),
        Some(doc) => Ok(optional_i64(doc, FIELD_LAST_MODIFIED)?.unwrap_or(0)),
    }
}

/// Decode a folder message. The identity key must parse; everything else
/// is optional.
pub fn decode_message(doc: &Document, folder: MessageFolder) -> Result<MessageRecord, ParseError> {
    let sort_key = require_i64(doc, folder.key_field())?;
    Ok(MessageRecord {
        folder,
        path: doc.path.clone(),
        sort_key,
        asn: optional_i64(doc, FIELD_ASN)?,
        created_unix_time: optional_i64(doc, FIELD_CREATED_TIME)?,
        is_delivered: flag(doc, FIELD_IS_DELIVERED)?,
        is_read: flag(doc, FIELD_IS_READ)?,
        form_id: optional_i64(doc, FIELD_FORM_ID)?,
        form_class: optional_i64(doc, FIELD_FORM_CLASS)?,
        payload: doc.get(FIELD_PAYLOAD).cloned().unwrap_or(Value::Null),
    })
}
