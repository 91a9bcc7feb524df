use actix_web::{FromRequest, HttpMessage};

use crate::error::Error;

/// The tenant id attached to a request by the authentication middleware.
///
/// This is the authoritative tenant for every operation; tenant segments in
/// queue URLs are informational only.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizedTenant(pub u64);

impl FromRequest for AuthorizedTenant {
    type Error = Error;

    type Future = std::future::Ready<Result<AuthorizedTenant, Self::Error>>;

    fn from_request(req: &actix_web::HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        std::future::ready(
            req.extensions()
                .get::<AuthorizedTenant>()
                .copied()
                .ok_or(Error::MissingAuthHeader),
        )
    }
}
