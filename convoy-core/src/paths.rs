//! Path builders for the store layout.

use crate::document::DocumentPath;
use crate::enums::{AckEventKind, MarkerKind, MessageFolder};
use crate::identity::{GroupId, ObcId, VehicleId};

fn customer(customer_id: &str) -> DocumentPath {
    DocumentPath::new(format!("customers/{customer_id}"))
}

pub fn units(customer_id: &str) -> DocumentPath {
    customer(customer_id).child("units")
}

pub fn unit(customer_id: &str, obc_id: ObcId) -> DocumentPath {
    units(customer_id).child(obc_id)
}

pub fn vehicle(customer_id: &str, vehicle_id: VehicleId) -> DocumentPath {
    customer(customer_id).child("vehicles").child(vehicle_id)
}

pub fn vehicle_groups(customer_id: &str, vehicle_id: VehicleId) -> DocumentPath {
    vehicle(customer_id, vehicle_id).child("groups")
}

pub fn group(customer_id: &str, group_id: GroupId) -> DocumentPath {
    customer(customer_id).child("groups").child(group_id)
}

pub fn group_forms(customer_id: &str, group_id: GroupId) -> DocumentPath {
    group(customer_id, group_id).child("forms")
}

pub fn group_users(customer_id: &str, group_id: GroupId) -> DocumentPath {
    group(customer_id, group_id).child("users")
}

pub fn marker(customer_id: &str, kind: MarkerKind) -> DocumentPath {
    customer(customer_id)
        .child("lastModified")
        .child(kind.document_id())
}

pub fn folder(customer_id: &str, vehicle_id: VehicleId, folder: MessageFolder) -> DocumentPath {
    vehicle(customer_id, vehicle_id).child(folder.collection())
}

pub fn ack_event(
    customer_id: &str,
    vehicle_id: VehicleId,
    asn: i64,
    kind: AckEventKind,
) -> DocumentPath {
    folder(customer_id, vehicle_id, MessageFolder::Inbox)
        .child(asn)
        .child("ackEvents")
        .child(kind.as_str())
}

pub fn form_template(customer_id: &str, form_id: i64) -> DocumentPath {
    customer(customer_id).child("formTemplates").child(form_id)
}
