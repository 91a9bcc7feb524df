//! SigV4 authentication middleware for the wire API.
//!
//! Every request on the API listener passes through here: the Authorization
//! header is parsed, the tenant is resolved from the access key id, the
//! payload is buffered so its hash can be verified, and on success the
//! authenticated tenant id is injected into the request extensions for
//! [`crate::auth::credential::AuthorizedTenant`] to extract.

use std::future::{Future, Ready};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header;
use actix_web::web::Data;
use actix_web::HttpMessage;
use bytes::{Bytes, BytesMut};
use futures_util::TryStreamExt;

use crate::auth::credential::AuthorizedTenant;
use crate::auth::crypto::sha256_hex;
use crate::auth::header::SigV4Header;
use crate::auth::sigv4;
use crate::error::Error;

pub struct Authentication;

impl<S: 'static, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = AuthenticationMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(AuthenticationMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct AuthenticationMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let svc = Rc::clone(&self.service);

        Box::pin(async move {
            let service = req
                .app_data::<Data<crate::service::Service>>()
                .expect("Service not registered. This is a bug.")
                .clone();

            let raw = {
                let value = req
                    .headers()
                    .get(header::AUTHORIZATION)
                    .ok_or(Error::MissingAuthHeader)?;

                value
                    .to_str()
                    .map_err(|_| Error::InvalidHeader {
                        header: "Authorization".to_owned(),
                    })?
                    .to_owned()
            };

            let header = crate::auth::header::parse(&raw)?;

            let tenant = service
                .resolve_tenant(header.key_id, header.region)
                .await?;

            let payload = buffer_payload(&mut req).await?;

            verify_request(&req, &header, &payload, &tenant.secret_access_key)?;

            tracing::debug!(tenant = tenant.id, key_id = header.key_id, "Authenticated request");

            req.extensions_mut().insert(AuthorizedTenant(tenant.id));

            svc.call(req).await
        })
    }
}

/// Collects the request payload and re-injects it so extractors downstream
/// still see a body. The signature covers the payload hash, so it has to be
/// read before the handler runs.
async fn buffer_payload(req: &mut ServiceRequest) -> Result<Bytes, Error> {
    let payload = req.take_payload();

    let bytes = payload
        .try_fold(BytesMut::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await
        .map_err(|e| {
            tracing::error!("Error reading request payload: {}", e);
            Error::internal(e)
        })?
        .freeze();

    let replay = actix_web::dev::Payload::Stream {
        payload: Box::pin(futures_util::stream::once(std::future::ready(Ok(
            bytes.clone()
        ))))
            as Pin<
                Box<dyn futures_util::Stream<Item = Result<_, actix_web::error::PayloadError>>>,
            >,
    };

    req.set_payload(replay);

    Ok(bytes)
}

fn verify_request(
    req: &ServiceRequest,
    header: &SigV4Header<'_>,
    payload: &[u8],
    secret: &str,
) -> Result<(), Error> {
    let (canonical_headers, signed_headers) =
        sigv4::canonical_headers(&header.signed_headers, |name| {
            req.headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.to_owned())
        })?;

    let canonical_request = sigv4::canonical_request(
        req.method().as_str(),
        req.uri().path(),
        req.uri().query().unwrap_or(""),
        &canonical_headers,
        &signed_headers,
        &sha256_hex(payload),
    );

    let amz_date = req
        .headers()
        .get("x-amz-date")
        .ok_or_else(|| Error::MissingHeader {
            header: "x-amz-date".to_owned(),
        })?
        .to_str()
        .map_err(|_| Error::InvalidHeader {
            header: "x-amz-date".to_owned(),
        })?;

    let string_to_sign = sigv4::string_to_sign(
        amz_date,
        &sigv4::credential_scope(header),
        &canonical_request,
    );

    sigv4::verify(secret, header, &string_to_sign)
}
