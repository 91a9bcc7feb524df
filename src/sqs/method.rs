use std::str::FromStr;

use actix_web::{FromRequest, HttpMessage};
use strum::EnumString;

use crate::error::Error;

pub const SQS_METHOD_PREFIX: &str = "AmazonSQS.";

/// Operations accepted on the wire, dispatched from `X-Amz-Target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
pub enum Method {
    CreateQueue,
    DeleteMessage,
    DeleteQueue,
    GetQueueAttributes,
    GetQueueUrl,
    ListQueues,
    PurgeQueue,
    ReceiveMessage,
    SendMessage,
}

impl Method {
    /// Parses a target header of the form `AmazonSQS.<Operation>`.
    ///
    /// A wrong prefix, an empty operation, and an operation this broker does
    /// not implement all look the same to a client, so they all report
    /// `UnknownOperation` with the full target echoed back.
    pub fn parse(target: &str) -> Result<Self, Error> {
        target
            .strip_prefix(SQS_METHOD_PREFIX)
            .and_then(|name| Method::from_str(name).ok())
            .ok_or_else(|| Error::UnknownOperation {
                target: target.to_owned(),
            })
    }
}

impl FromRequest for Method {
    type Error = Error;

    type Future = std::future::Ready<Result<Self, Self::Error>>;

    fn from_request(req: &actix_web::HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        // Seeded by the SqsApi middleware; absence means the request never
        // went through it.
        let method = req.extensions().get::<Method>().copied();

        std::future::ready(match method {
            Some(method) => Ok(method),
            None => Err(Error::MissingHeader {
                header: "X-Amz-Target".to_owned(),
            }),
        })
    }
}
