//! JSON endpoints backing the management UI.
//!
//! The UI is an external collaborator; these routes are the engine interface
//! it consumes. Everything runs as the ambient operator tenant resolved via
//! `Service::current_tenant`, and nothing here touches storage directly.

use std::collections::BTreeMap;

use actix_web::{delete, get, post, web, Responder, Scope};
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    message::{AttributeValue, FilterCriteria, Message, MessageState},
    queue::QueueStats,
    service::Service,
};

#[derive(Serialize)]
struct QueueSummary {
    name: String,
    stats: QueueStats,
}

#[derive(Serialize)]
struct MessageView {
    id: u64,
    state: MessageState,
    body: String,
    visible_at: i64,
    enqueued_at: i64,
    deliveries: u64,
    attributes: BTreeMap<String, AttributeValue>,
}

impl From<Message> for MessageView {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            state: message.state,
            body: String::from_utf8_lossy(&message.body).into_owned(),
            visible_at: message.visible_at,
            enqueued_at: message.enqueued_at,
            deliveries: message.deliveries,
            attributes: message.attributes,
        }
    }
}

#[get("")]
async fn list_queues(service: web::Data<Service>) -> Result<impl Responder, Error> {
    let tenant = service.current_tenant().await?;

    let queues = service.list_queues(tenant.id, None).await?;

    let mut summaries = Vec::with_capacity(queues.len());
    for queue in queues {
        let stats = service.stats(tenant.id, &queue.name).await?;
        summaries.push(QueueSummary {
            name: queue.name,
            stats,
        });
    }

    Ok(web::Json(summaries))
}

#[post("/{name}")]
async fn create_queue(
    service: web::Data<Service>,
    path: web::Path<String>,
) -> Result<impl Responder, Error> {
    let tenant = service.current_tenant().await?;

    service
        .create_queue(tenant.id, &path, &Default::default())
        .await?;

    Ok("OK")
}

#[delete("/{name}")]
async fn delete_queue(
    service: web::Data<Service>,
    path: web::Path<String>,
) -> Result<impl Responder, Error> {
    let tenant = service.current_tenant().await?;

    service.delete_queue(tenant.id, &path).await?;

    Ok("OK")
}

#[derive(Deserialize)]
struct FilterQuery {
    filter: Option<String>,
}

#[derive(Serialize)]
struct QueueDetail {
    name: String,
    stats: QueueStats,
    messages: Vec<MessageView>,
}

#[get("/{name}")]
async fn queue_detail(
    service: web::Data<Service>,
    path: web::Path<String>,
    query: web::Query<FilterQuery>,
) -> Result<impl Responder, Error> {
    let tenant = service.current_tenant().await?;

    let stats = service.stats(tenant.id, &path).await?;

    let criteria = FilterCriteria::parse(query.filter.as_deref().unwrap_or(""));
    let ids = service.filter(tenant.id, &path, &criteria).await?;

    let mut messages = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(message) = service.peek(tenant.id, &path, id).await? {
            messages.push(MessageView::from(message));
        }
    }

    Ok(web::Json(QueueDetail {
        name: path.into_inner(),
        stats,
        messages,
    }))
}

#[get("/{name}/messages/{id}")]
async fn peek_message(
    service: web::Data<Service>,
    path: web::Path<(String, u64)>,
) -> Result<impl Responder, Error> {
    let (name, id) = path.into_inner();
    let tenant = service.current_tenant().await?;

    let message = service
        .peek(tenant.id, &name, id)
        .await?
        .ok_or(Error::MessageNotFound { id })?;

    Ok(web::Json(MessageView::from(message)))
}

pub fn service() -> Scope {
    web::scope("/queues")
        .service(list_queues)
        .service(create_queue)
        .service(delete_queue)
        .service(queue_detail)
        .service(peek_message)
}
