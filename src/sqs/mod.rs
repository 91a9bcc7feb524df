//! Protocol adapter: translates between the SQS JSON/1.0 wire model and the
//! queue engine.
//!
//! Dispatch happens on the parsed `X-Amz-Target` method rather than the URL;
//! every request is a `POST` to an arbitrary path. Queue URLs embed a tenant
//! segment but only the final path segment is trusted, and only as a queue
//! name. The authenticated tenant always wins; a mismatching tenant segment
//! is accepted silently, mirroring AWS client behavior.

use std::collections::{BTreeMap, HashMap};

use actix_web::{
    web::{self, Data},
    Responder,
};
use serde::de::DeserializeOwned;
use url::Url;

use crate::{
    auth::credential::AuthorizedTenant,
    error::Error,
    message::{AttributeValue, Message, MessageState},
    service::Service,
};

use method::Method;
use types::{
    create_queue::{CreateQueueRequest, CreateQueueResponse},
    delete_message::{DeleteMessageRequest, DeleteMessageResponse},
    delete_queue::{DeleteQueueRequest, DeleteQueueResponse},
    get_queue_attributes::{GetQueueAttributesRequest, GetQueueAttributesResponse},
    get_queue_url::{GetQueueUrlRequest, GetQueueUrlResponse},
    list_queues::{ListQueuesRequest, ListQueuesResponse},
    md5_of_attributes, md5_of_body,
    purge_queue::{PurgeQueueRequest, PurgeQueueResponse},
    receive_message::{ReceiveMessageRequest, ReceiveMessageResponse},
    send_message::{SendMessageRequest, SendMessageResponse},
    MessageAttributeValue, SqsResponse,
};

pub mod method;
pub mod service;
pub mod types;

/// AWS CLI and SDKs send an empty body for parameterless operations, and the
/// `application/x-amz-json-1.0` content type is never enforced; only the raw
/// bytes matter.
fn parse_body<T: DeserializeOwned>(body: &web::Bytes) -> Result<T, Error> {
    let raw: &[u8] = if body.is_empty() { b"{}" } else { body };
    Ok(serde_json::from_slice(raw)?)
}

fn queue_url(region: &str, tenant: u64, queue_name: &str) -> Result<Url, Error> {
    Url::parse(&format!(
        "https://sqs.{region}.amazonaws.com/{tenant}/{queue_name}"
    ))
    .map_err(Error::internal)
}

/// The queue name is the final path segment; everything before it is
/// informational.
fn queue_name(url: &Url) -> Result<&str, Error> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| Error::invalid_parameter("QueueUrl has no queue name"))
}

fn wire_message(message: Message) -> types::receive_message::Message {
    let attributes: BTreeMap<String, MessageAttributeValue> = message
        .attributes
        .into_iter()
        .map(|(k, v)| (k, v.into()))
        .collect();

    let md5_of_message_attributes =
        (!attributes.is_empty()).then(|| md5_of_attributes(&attributes));

    types::receive_message::Message {
        message_id: message.id.to_string(),
        receipt_handle: message.id.to_string(),
        md5_of_body: md5_of_body(&message.body),
        body: String::from_utf8_lossy(&message.body).into_owned(),
        message_attributes: attributes,
        md5_of_message_attributes,
    }
}

async fn send_message(
    service: &Service,
    tenant: u64,
    body: &web::Bytes,
) -> Result<SqsResponse, Error> {
    let request: SendMessageRequest = parse_body(body)?;
    let queue = queue_name(&request.queue_url)?;

    let attributes: BTreeMap<String, AttributeValue> = request
        .message_attributes
        .iter()
        .map(|(k, v)| (k.clone(), v.clone().into()))
        .collect();

    let message_id = service
        .enqueue(
            tenant,
            queue,
            request.message_body.as_bytes(),
            attributes,
            request.delay_seconds,
            None,
        )
        .await?;

    let md5_of_message_attributes = (!request.message_attributes.is_empty())
        .then(|| md5_of_attributes(&request.message_attributes));

    Ok(SqsResponse::SendMessage(SendMessageResponse {
        message_id: message_id.to_string(),
        md5_of_message_body: md5_of_body(request.message_body.as_bytes()),
        md5_of_message_attributes,
    }))
}

async fn receive_message(
    service: &Service,
    tenant: u64,
    body: &web::Bytes,
) -> Result<SqsResponse, Error> {
    let request: ReceiveMessageRequest = parse_body(body)?;
    let queue = queue_name(&request.queue_url)?;

    let messages = service
        .dequeue(
            tenant,
            queue,
            request.max_number_of_messages.unwrap_or(1),
            request.visibility_timeout,
            request.wait_time_seconds,
        )
        .await?;

    Ok(SqsResponse::ReceiveMessage(ReceiveMessageResponse {
        messages: messages.into_iter().map(wire_message).collect(),
    }))
}

async fn delete_message(
    service: &Service,
    tenant: u64,
    body: &web::Bytes,
) -> Result<SqsResponse, Error> {
    let request: DeleteMessageRequest = parse_body(body)?;
    let queue = queue_name(&request.queue_url)?;

    let message_id = request
        .receipt_handle
        .parse::<u64>()
        .map_err(|e| Error::invalid_parameter(format!("ReceiptHandle: {e}")))?;

    match service.delete_message(tenant, queue, message_id).await {
        // Deleting after the message was purged or its queue recreated is not
        // a client-visible failure.
        Ok(()) | Err(Error::MessageNotFound { .. }) => {
            Ok(SqsResponse::DeleteMessage(DeleteMessageResponse {}))
        }
        Err(e) => Err(e),
    }
}

async fn list_queues(
    service: &Service,
    tenant: u64,
    body: &web::Bytes,
) -> Result<SqsResponse, Error> {
    let request: ListQueuesRequest = parse_body(body)?;

    let queues = service
        .list_queues(tenant, request.queue_name_prefix.as_deref())
        .await?;

    let mut queue_urls = Vec::with_capacity(queues.len());
    for queue in &queues {
        queue_urls.push(queue_url(service.config().region(), tenant, &queue.name)?);
    }

    Ok(SqsResponse::ListQueues(ListQueuesResponse { queue_urls }))
}

async fn create_queue(
    service: &Service,
    tenant: u64,
    body: &web::Bytes,
) -> Result<SqsResponse, Error> {
    let request: CreateQueueRequest = parse_body(body)?;

    let queue = service
        .create_queue(tenant, &request.queue_name, &request.attributes)
        .await?;

    Ok(SqsResponse::CreateQueue(CreateQueueResponse {
        queue_url: queue_url(service.config().region(), tenant, &queue.name)?,
    }))
}

async fn delete_queue(
    service: &Service,
    tenant: u64,
    body: &web::Bytes,
) -> Result<SqsResponse, Error> {
    let request: DeleteQueueRequest = parse_body(body)?;
    let queue = queue_name(&request.queue_url)?;

    service.delete_queue(tenant, queue).await?;

    Ok(SqsResponse::DeleteQueue(DeleteQueueResponse {}))
}

async fn purge_queue(
    service: &Service,
    tenant: u64,
    body: &web::Bytes,
) -> Result<SqsResponse, Error> {
    let request: PurgeQueueRequest = parse_body(body)?;
    let queue = queue_name(&request.queue_url)?;

    service.purge_queue(tenant, queue).await?;

    Ok(SqsResponse::PurgeQueue(PurgeQueueResponse { success: true }))
}

async fn get_queue_attributes(
    service: &Service,
    tenant: u64,
    body: &web::Bytes,
) -> Result<SqsResponse, Error> {
    let request: GetQueueAttributesRequest = parse_body(body)?;
    let name = queue_name(&request.queue_url)?;

    let queue = service.get_queue(tenant, name).await?;
    let stats = service.stats(tenant, name).await?;

    let all: [(&str, String); 6] = [
        (
            "ApproximateNumberOfMessages",
            stats.count(MessageState::Visible).to_string(),
        ),
        (
            "ApproximateNumberOfMessagesNotVisible",
            stats.count(MessageState::Leased).to_string(),
        ),
        (
            "ApproximateNumberOfMessagesDelayed",
            stats.count(MessageState::Delayed).to_string(),
        ),
        ("VisibilityTimeout", queue.visibility_timeout.to_string()),
        ("DelaySeconds", queue.delay_seconds.to_string()),
        ("CreatedTimestamp", (queue.created_at / 1000).to_string()),
    ];

    let wanted = |name: &str| {
        request.attribute_names.is_empty()
            || request
                .attribute_names
                .iter()
                .any(|n| n == "All" || n == name)
    };

    let attributes: HashMap<String, String> = all
        .into_iter()
        .filter(|(name, _)| wanted(name))
        .map(|(name, value)| (name.to_owned(), value))
        .collect();

    Ok(SqsResponse::GetQueueAttributes(GetQueueAttributesResponse {
        attributes,
    }))
}

async fn get_queue_url(
    service: &Service,
    tenant: u64,
    body: &web::Bytes,
) -> Result<SqsResponse, Error> {
    let request: GetQueueUrlRequest = parse_body(body)?;

    let queue = service.get_queue(tenant, &request.queue_name).await?;

    Ok(SqsResponse::GetQueueUrl(GetQueueUrlResponse {
        queue_url: queue_url(service.config().region(), tenant, &queue.name)?,
    }))
}

/// Single entry point for the API listener: authenticated, method-tagged
/// requests land here regardless of path.
pub async fn dispatch(
    service: Data<Service>,
    method: Method,
    tenant: AuthorizedTenant,
    body: web::Bytes,
) -> Result<impl Responder, Error> {
    let tenant = tenant.0;

    let res = match method {
        Method::SendMessage => send_message(&service, tenant, &body).await?,
        Method::ReceiveMessage => receive_message(&service, tenant, &body).await?,
        Method::DeleteMessage => delete_message(&service, tenant, &body).await?,
        Method::ListQueues => list_queues(&service, tenant, &body).await?,
        Method::CreateQueue => create_queue(&service, tenant, &body).await?,
        Method::DeleteQueue => delete_queue(&service, tenant, &body).await?,
        Method::PurgeQueue => purge_queue(&service, tenant, &body).await?,
        Method::GetQueueAttributes => get_queue_attributes(&service, tenant, &body).await?,
        Method::GetQueueUrl => get_queue_url(&service, tenant, &body).await?,
    };

    Ok(web::Json(res))
}
