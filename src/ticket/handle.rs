use super::attachment;
use super::Ticket;
use super::TicketAction;
use super::TicketStatus;
use crate::account;
use crate::account::Account;
use crate::account::Permission;
use crate::RequirePermissionContext;
use crate::ResError;
use axum::body::Bytes;
use axum::Json;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::json;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use tracing::info;

use cira_shared::account::Role;
use cira_shared::ticket::handle::*;

/// Read and store an uploaded image, returning its hash.
pub async fn upload_image(
    ctx: RequirePermissionContext,
    bytes: Bytes,
) -> axum::response::Result<Json<serde_json::Value>> {
    ctx.valid(&[Permission::Submit]).map_err(ResError)?;

    let attachment =
        attachment::Attachment::new(&bytes, ctx.account_id).map_err(ResError)?;
    let hash = attachment.hash;
    attachment::INSTANCE.push(attachment);

    Ok(Json(json!({ "hash": hash })))
}

/// Get the png bytes of the target attachment.
pub async fn get_image(
    ctx: RequirePermissionContext,
    Json(descriptor): Json<GetImageDescriptor>,
) -> axum::response::Result<Vec<u8>> {
    ctx.valid(&[Permission::View]).map_err(ResError)?;

    if attachment::INSTANCE.contains(descriptor.hash) {
        #[cfg(not(test))]
        return std::fs::File::open(format!("./data/images/{}.png", descriptor.hash))
            .map(|mut file| {
                let mut vec = Vec::new();
                let _ = std::io::Read::read_to_end(&mut file, &mut vec);

                vec
            })
            .map_err(|err| ResError(attachment::Error::Io(err)).into());

        #[cfg(test)]
        unreachable!("test not covered");
    }

    Err(ResError(attachment::Error::NotFound).into())
}

/// Submit a new ticket, which starts out pending.
pub async fn create_ticket(
    ctx: RequirePermissionContext,
    Json(descriptor): Json<TicketDescriptor>,
) -> axum::response::Result<Json<serde_json::Value>> {
    ctx.valid(&[Permission::Submit]).map_err(ResError)?;

    for (value, field) in [
        (&descriptor.classroom, "classroom"),
        (&descriptor.unit_id, "unit id"),
        (&descriptor.issue_type, "issue type"),
        (&descriptor.description, "description"),
    ] {
        if value.trim().is_empty() {
            return Err(ResError(super::Error::FieldEmpty(field)).into());
        }
    }

    if let Some(hash) = descriptor.image {
        if !attachment::INSTANCE.contains(hash) {
            return Err(ResError(super::Error::Attachment(attachment::Error::NotFound)).into());
        }
    }

    let created_at = Utc::now();

    let ticket = Ticket {
        id: {
            let mut hasher = DefaultHasher::new();
            ctx.account_id.hash(&mut hasher);
            descriptor.classroom.hash(&mut hasher);
            descriptor.description.hash(&mut hasher);
            created_at.timestamp_micros().hash(&mut hasher);
            let id = hasher.finish();

            if super::INSTANCE.contains_id(id) {
                return Err(ResError(super::Error::Conflict).into());
            }

            id
        },
        reporter: ctx.account_id,
        classroom: descriptor.classroom,
        unit_id: descriptor.unit_id,
        issue_type: descriptor.issue_type,
        issue_subtype: descriptor.issue_subtype,
        description: descriptor.description,
        image: descriptor.image,
        status: TicketStatus::Pending,
        created_at,
        updated_at: created_at,
        resolution_note: None,
        reviewed_by: None,
    };

    if let Some(hash) = ticket.image {
        attachment::INSTANCE
            .pin(hash)
            .map_err(|err| ResError(super::Error::Attachment(err)))?;
    }

    super::save_ticket(&ticket);
    let id = ticket.id;
    super::INSTANCE.push(ticket);

    info!("ticket {id} submitted by account {}", ctx.account_id);

    Ok(Json(json!({ "ticket_id": id })))
}

/// Whether the requesting account may see the target ticket at all.
/// Students only see their own reports while reviewing and managing
/// roles see everything.
fn visible_to(ticket: &Ticket, account_id: u64, role: Role) -> bool {
    ticket.reporter == account_id
        || role.has_permission(Permission::Review)
        || role.has_permission(Permission::ManageTickets)
}

/// If the target ticket matches the filter for the requesting
/// account.
fn matches_get_tickets_filter(filter: &GetTicketsFilter, ticket: &Ticket, account_id: u64) -> bool {
    match filter {
        GetTicketsFilter::Status(status) => ticket.status == *status,
        GetTicketsFilter::Reporter(reporter) => ticket.reporter == *reporter,
        GetTicketsFilter::Mine => ticket.reporter == account_id,
        GetTicketsFilter::ReviewQueue => {
            ticket.status == TicketStatus::Pending && ticket.reporter != account_id
        }
        GetTicketsFilter::Keyword(keywords) => keywords.split_whitespace().all(|keyword| {
            ticket.description.contains(keyword)
                || ticket.classroom.contains(keyword)
                || ticket.issue_type.contains(keyword)
        }),
    }
}

/// Get the ids of the tickets the requesting account may see,
/// narrowed down by the filters in the descriptor.
pub async fn get_tickets(
    ctx: RequirePermissionContext,
    Json(descriptor): Json<GetTicketsDescriptor>,
) -> axum::response::Result<Json<serde_json::Value>> {
    let role = ctx.valid(&[Permission::View]).map_err(ResError)?;

    let mut tickets = Vec::new();
    for ticket in super::INSTANCE.tickets.read().iter() {
        let tr = ticket.read();
        if visible_to(tr.deref(), ctx.account_id, role)
            && descriptor
                .filters
                .iter()
                .all(|filter| matches_get_tickets_filter(filter, tr.deref(), ctx.account_id))
        {
            tickets.push(tr.id);
        }
    }

    Ok(Json(json!({ "tickets": tickets })))
}

/// Get the full information of the target tickets. Tickets out of
/// the requesting account's scope come back as not found.
pub async fn get_tickets_info(
    ctx: RequirePermissionContext,
    Json(descriptor): Json<GetTicketsInfoDescriptor>,
) -> axum::response::Result<Json<serde_json::Value>> {
    let role = ctx.valid(&[Permission::View]).map_err(ResError)?;

    let mut results = Vec::new();
    let b = super::INSTANCE.tickets.read();

    for id in descriptor.tickets {
        let ticket = b.iter().find(|ticket| ticket.read().id == id);
        match ticket {
            Some(ticket) => {
                let tr = ticket.read();
                if visible_to(tr.deref(), ctx.account_id, role) {
                    results.push(GetTicketInfoResult::Full(tr.clone()));
                } else {
                    results.push(GetTicketInfoResult::NotFound(id));
                }
            }
            None => results.push(GetTicketInfoResult::NotFound(id)),
        }
    }

    Ok(Json(json!({ "results": results })))
}

/// Edit a pending ticket of the requesting account.
pub async fn edit_ticket(
    ctx: RequirePermissionContext,
    Json(descriptor): Json<EditTicketDescriptor>,
) -> axum::response::Result<Json<serde_json::Value>> {
    ctx.valid(&[Permission::Submit]).map_err(ResError)?;

    {
        let b = super::INSTANCE.tickets.read();
        let ticket = b
            .iter()
            .find(|ticket| ticket.read().id == descriptor.ticket)
            .ok_or(ResError(super::Error::NotFound))?;
        let tr = ticket.read();
        if tr.reporter != ctx.account_id {
            return Err(ResError(account::Error::PermissionDenied).into());
        }
        if tr.status != TicketStatus::Pending {
            return Err(ResError(super::Error::NotEditable(tr.status)).into());
        }
    }

    for variant in descriptor.variants {
        apply_edit_ticket_variant(variant, descriptor.ticket).map_err(ResError)?;
    }

    Ok(Json(json!({})))
}

fn apply_edit_ticket_variant(variant: EditTicketVariant, ticket_id: u64) -> Result<(), super::Error> {
    match variant {
        EditTicketVariant::Classroom(value) => {
            if value.trim().is_empty() {
                return Err(super::Error::FieldEmpty("classroom"));
            }
            if !super::INSTANCE.update(ticket_id, |ticket| ticket.classroom = value) {
                return Err(super::Error::NotFound);
            }
        }
        EditTicketVariant::UnitId(value) => {
            if value.trim().is_empty() {
                return Err(super::Error::FieldEmpty("unit id"));
            }
            if !super::INSTANCE.update(ticket_id, |ticket| ticket.unit_id = value) {
                return Err(super::Error::NotFound);
            }
        }
        EditTicketVariant::IssueType(value) => {
            if value.trim().is_empty() {
                return Err(super::Error::FieldEmpty("issue type"));
            }
            if !super::INSTANCE.update(ticket_id, |ticket| ticket.issue_type = value) {
                return Err(super::Error::NotFound);
            }
        }
        EditTicketVariant::IssueSubtype(value) => {
            if !super::INSTANCE.update(ticket_id, |ticket| ticket.issue_subtype = value) {
                return Err(super::Error::NotFound);
            }
        }
        EditTicketVariant::Description(value) => {
            if value.trim().is_empty() {
                return Err(super::Error::FieldEmpty("description"));
            }
            if !super::INSTANCE.update(ticket_id, |ticket| ticket.description = value) {
                return Err(super::Error::NotFound);
            }
        }
        EditTicketVariant::Image(value) => {
            if let Some(hash) = value {
                if !attachment::INSTANCE.contains(hash) {
                    return Err(super::Error::Attachment(attachment::Error::NotFound));
                }
            }

            let mut previous = None;
            if !super::INSTANCE.update(ticket_id, |ticket| {
                previous = ticket.image;
                ticket.image = value;
            }) {
                return Err(super::Error::NotFound);
            }

            if let Some(hash) = value {
                attachment::INSTANCE
                    .pin(hash)
                    .map_err(super::Error::Attachment)?;
            }
            if let Some(hash) = previous.filter(|hash| value != Some(*hash)) {
                if !super::INSTANCE.references_image(hash) {
                    attachment::INSTANCE.unpin(hash);
                }
            }
        }
    }
    Ok(())
}

/// Approve or reject a pending ticket submitted by someone else.
pub async fn review_ticket(
    ctx: RequirePermissionContext,
    Json(descriptor): Json<ReviewTicketDescriptor>,
) -> axum::response::Result<Json<serde_json::Value>> {
    let role = ctx.valid(&[Permission::Review]).map_err(ResError)?;

    let b = super::INSTANCE.tickets.read();
    let ticket = b
        .iter()
        .find(|ticket| ticket.read().id == descriptor.ticket)
        .ok_or(ResError(super::Error::NotFound))?;

    let mut tw = ticket.write();
    if tw.reporter == ctx.account_id {
        return Err(ResError(super::Error::SelfReview).into());
    }

    let action = descriptor.variant.action();
    let status = tw
        .status
        .transition(&action, role)
        .map_err(|err| ResError(super::Error::Transition(err)))?;

    tw.status = status;
    tw.reviewed_by = Some(ctx.account_id);
    tw.touch();
    super::save_ticket(tw.deref());

    info!(
        "ticket {} {} by account {}",
        descriptor.ticket,
        status,
        ctx.account_id
    );

    Ok(Json(json!({ "status": status })))
}

/// Move an approved ticket forward, with a mandatory resolution note
/// when resolving.
pub async fn advance_ticket(
    ctx: RequirePermissionContext,
    Json(descriptor): Json<AdvanceTicketDescriptor>,
) -> axum::response::Result<Json<serde_json::Value>> {
    let role = ctx.valid(&[Permission::Advance]).map_err(ResError)?;

    let b = super::INSTANCE.tickets.read();
    let ticket = b
        .iter()
        .find(|ticket| ticket.read().id == descriptor.ticket)
        .ok_or(ResError(super::Error::NotFound))?;

    let mut tw = ticket.write();
    let action = descriptor.variant.action();
    let status = tw
        .status
        .transition(&action, role)
        .map_err(|err| ResError(super::Error::Transition(err)))?;

    tw.status = status;
    if let TicketAction::Resolve { note } = action {
        tw.resolution_note = Some(note.trim().to_string());
    }
    tw.touch();
    super::save_ticket(tw.deref());

    info!(
        "ticket {} moved to {} by account {}",
        descriptor.ticket,
        status,
        ctx.account_id
    );

    Ok(Json(json!({ "status": status })))
}

/// Remove a ticket. Reporters may delete their own tickets and
/// ticket managers any.
pub async fn delete_ticket(
    ctx: RequirePermissionContext,
    Json(descriptor): Json<DeleteTicketDescriptor>,
) -> axum::response::Result<Json<serde_json::Value>> {
    let role = ctx.valid(&[Permission::View]).map_err(ResError)?;

    {
        let b = super::INSTANCE.tickets.read();
        let ticket = b
            .iter()
            .find(|ticket| ticket.read().id == descriptor.ticket)
            .ok_or(ResError(super::Error::NotFound))?;
        let tr = ticket.read();
        if tr.reporter != ctx.account_id && !role.has_permission(Permission::ManageTickets) {
            return Err(ResError(account::Error::PermissionDenied).into());
        }
    }

    super::INSTANCE.delete(descriptor.ticket);

    info!("ticket {} deleted by account {}", descriptor.ticket, ctx.account_id);
    Ok(Json(json!({})))
}

fn collect_stats(tickets: &[RwLock<Ticket>], mut include: impl FnMut(&Ticket) -> bool) -> TicketStats {
    let mut stats = TicketStats::default();
    for ticket in tickets {
        let tr = ticket.read();
        if include(tr.deref()) {
            stats.count(tr.status);
        }
    }
    stats
}

/// The role-scoped dashboard. Students see their own counts, class
/// representatives additionally the size of their review queue and
/// admins the whole store with pending role requests.
pub async fn dashboard(
    ctx: RequirePermissionContext,
) -> axum::response::Result<Json<DashboardView>> {
    let role = ctx.valid(&[Permission::View]).map_err(ResError)?;

    let b = super::INSTANCE.tickets.read();

    let view = match role {
        Role::Student => DashboardView::Student {
            stats: collect_stats(&b, |ticket| ticket.reporter == ctx.account_id),
        },
        Role::ClassRepresentative => DashboardView::ClassRepresentative {
            stats: collect_stats(&b, |ticket| ticket.reporter == ctx.account_id),
            review_queue: b
                .iter()
                .filter(|ticket| {
                    let tr = ticket.read();
                    tr.status == TicketStatus::Pending && tr.reporter != ctx.account_id
                })
                .count(),
        },
        Role::Admin => DashboardView::Admin {
            stats: collect_stats(&b, |_| true),
            role_requests: account::INSTANCE
                .inner()
                .read()
                .iter()
                .filter(|account| {
                    matches!(
                        account.read().deref(),
                        Account::Verified { profile, .. } if profile.requested_role.is_some()
                    )
                })
                .count(),
        },
    };

    Ok(Json(view))
}
