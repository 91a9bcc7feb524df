//! Wire-level tests: signed HTTP requests through the full middleware chain.

use actix_web::{test, web, App};
use serde_json::{json, Value};
use tempfile::TempDir;

use burrow::{
    auth::{crypto::sha256_hex, middleware::Authentication, sigv4},
    config::{defaults, Config},
    service::Service,
    sqs,
};

const AMZ_DATE: &str = "20250102T000000Z";
const DATE: &str = "20250102";
const REGION: &str = "us-east-1";
const SQS_SERVICE: &str = "sqs";
const HOST: &str = "localhost:3001";

async fn setup() -> (Service, TempDir) {
    let tmpdir = tempfile::tempdir().unwrap();

    let service = Service::connect_with(Config {
        db_path: Some(tmpdir.path().join("burrow.db").to_string_lossy().to_string()),
        ..Default::default()
    })
    .await
    .unwrap();

    (service, tmpdir)
}

macro_rules! sqs_app {
    ($svc:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($svc.clone()))
                .wrap(sqs::service::SqsApi)
                .wrap(Authentication)
                .default_service(web::post().to(sqs::dispatch)),
        )
        .await
    };
}

/// Calls the service and returns `(status, json body)` whether the request
/// failed in a handler (materialized response) or in middleware (service
/// error).
macro_rules! call_raw {
    ($app:expr, $req:expr) => {{
        match test::try_call_service(&$app, $req).await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body: Value = test::read_body_json(resp).await;
                (status, body)
            }
            Err(e) => {
                let resp = e.error_response();
                let status = resp.status().as_u16();
                let bytes = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
                let body: Value = serde_json::from_slice(&bytes).unwrap();
                (status, body)
            }
        }
    }};
}

/// Signs a request the way an SQS client would, then tags it with the
/// resulting Authorization header.
fn signed_request(
    key_id: &str,
    secret: &str,
    target: &str,
    body: &str,
) -> test::TestRequest {
    let (canonical_headers, signed_headers) =
        sigv4::canonical_headers(&["host", "x-amz-date", "x-amz-target"], |name| match name {
            "host" => Some(HOST.to_owned()),
            "x-amz-date" => Some(AMZ_DATE.to_owned()),
            "x-amz-target" => Some(target.to_owned()),
            _ => None,
        })
        .unwrap();

    let canonical_request = sigv4::canonical_request(
        "POST",
        "/",
        "",
        &canonical_headers,
        &signed_headers,
        &sha256_hex(body.as_bytes()),
    );

    let scope = format!("{DATE}/{REGION}/{SQS_SERVICE}/aws4_request");
    let string_to_sign = sigv4::string_to_sign(AMZ_DATE, &scope, &canonical_request);
    let signature =
        sigv4::compute_signature(secret, DATE, REGION, SQS_SERVICE, &string_to_sign).unwrap();

    test::TestRequest::post()
        .uri("/")
        .insert_header(("Host", HOST))
        .insert_header(("X-Amz-Date", AMZ_DATE))
        .insert_header(("X-Amz-Target", target))
        .insert_header(("Content-Type", "application/x-amz-json-1.0"))
        .insert_header((
            "Authorization",
            format!(
                "AWS4-HMAC-SHA256 Credential={key_id}/{DATE}/{REGION}/{SQS_SERVICE}/aws4_request, \
                 SignedHeaders={signed_headers}, Signature={signature}"
            ),
        ))
        .set_payload(body.to_owned())
}

fn root_request(target: &str, body: &str) -> test::TestRequest {
    signed_request(
        defaults::ROOT_ACCESS_KEY_ID,
        defaults::ROOT_SECRET_ACCESS_KEY,
        target,
        body,
    )
}

#[actix_web::test]
async fn test_create_send_receive_delete() {
    let (service, _tmpdir) = setup().await;
    let app = sqs_app!(service);

    let resp = test::call_service(
        &app,
        root_request("AmazonSQS.CreateQueue", r#"{"QueueName":"q1"}"#).to_request(),
    )
    .await;
    assert!(resp.status().is_success());
    let body: Value = test::read_body_json(resp).await;
    let queue_url = body["QueueUrl"].as_str().unwrap().to_owned();
    assert!(queue_url.ends_with("/q1"), "unexpected url {queue_url}");

    let send = json!({"QueueUrl": queue_url, "MessageBody": "hello world"});
    let resp = test::call_service(
        &app,
        root_request("AmazonSQS.SendMessage", &send.to_string()).to_request(),
    )
    .await;
    assert!(resp.status().is_success());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(
        body["MD5OfMessageBody"].as_str().unwrap(),
        "5eb63bbbe01eeed093cb22bb8f5acdc3"
    );
    assert!(body.get("MD5OfMessageAttributes").is_none());

    let receive = json!({"QueueUrl": queue_url, "MaxNumberOfMessages": 1});
    let resp = test::call_service(
        &app,
        root_request("AmazonSQS.ReceiveMessage", &receive.to_string()).to_request(),
    )
    .await;
    assert!(resp.status().is_success());
    let body: Value = test::read_body_json(resp).await;
    let messages = body["Messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["Body"].as_str().unwrap(), "hello world");
    assert_eq!(messages[0]["MessageId"], messages[0]["ReceiptHandle"]);
    assert_eq!(
        messages[0]["MD5OfBody"].as_str().unwrap(),
        "5eb63bbbe01eeed093cb22bb8f5acdc3"
    );

    let receipt = messages[0]["ReceiptHandle"].as_str().unwrap().to_owned();
    let delete = json!({"QueueUrl": queue_url, "ReceiptHandle": receipt});
    let resp = test::call_service(
        &app,
        root_request("AmazonSQS.DeleteMessage", &delete.to_string()).to_request(),
    )
    .await;
    assert!(resp.status().is_success());

    let resp = test::call_service(
        &app,
        root_request("AmazonSQS.ReceiveMessage", &receive.to_string()).to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert!(body["Messages"].as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn test_attribute_round_trip() {
    let (service, _tmpdir) = setup().await;
    let app = sqs_app!(service);

    let resp = test::call_service(
        &app,
        root_request("AmazonSQS.CreateQueue", r#"{"QueueName":"q1"}"#).to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    let queue_url = body["QueueUrl"].as_str().unwrap().to_owned();

    let send = json!({
        "QueueUrl": queue_url,
        "MessageBody": "payload",
        "MessageAttributes": {
            "foo": {"DataType": "Binary", "BinaryValue": "AQID"},
            "n": {"DataType": "Number", "StringValue": "42"}
        }
    });
    let resp = test::call_service(
        &app,
        root_request("AmazonSQS.SendMessage", &send.to_string()).to_request(),
    )
    .await;
    assert!(resp.status().is_success());
    let body: Value = test::read_body_json(resp).await;
    let sent_digest = body["MD5OfMessageAttributes"].as_str().unwrap().to_owned();
    assert_eq!(sent_digest.len(), 32);

    let receive = json!({"QueueUrl": queue_url});
    let resp = test::call_service(
        &app,
        root_request("AmazonSQS.ReceiveMessage", &receive.to_string()).to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    let message = &body["Messages"][0];

    assert_eq!(
        message["MessageAttributes"]["foo"]["DataType"].as_str(),
        Some("Binary")
    );
    assert_eq!(
        message["MessageAttributes"]["foo"]["BinaryValue"].as_str(),
        Some("AQID")
    );
    assert_eq!(
        message["MessageAttributes"]["n"]["DataType"].as_str(),
        Some("Number")
    );
    assert_eq!(
        message["MessageAttributes"]["n"]["StringValue"].as_str(),
        Some("42")
    );
    assert_eq!(
        message["MD5OfMessageAttributes"].as_str(),
        Some(sent_digest.as_str())
    );
}

#[actix_web::test]
async fn test_tampered_body_is_rejected() {
    let (service, _tmpdir) = setup().await;
    let app = sqs_app!(service);

    // Sign one body, send another.
    let req = root_request("AmazonSQS.CreateQueue", r#"{"QueueName":"q1"}"#)
        .set_payload(r#"{"QueueName":"evil"}"#.to_owned())
        .to_request();

    let (status, body) = call_raw!(app, req);
    assert_eq!(status, 403);
    assert_eq!(
        body["__type"].as_str(),
        Some("com.amazonaws.sqs#SignatureDoesNotMatch")
    );
}

#[actix_web::test]
async fn test_missing_auth_header() {
    let (service, _tmpdir) = setup().await;
    let app = sqs_app!(service);

    let req = test::TestRequest::post()
        .uri("/")
        .insert_header(("X-Amz-Target", "AmazonSQS.ListQueues"))
        .to_request();

    let (status, body) = call_raw!(app, req);
    assert_eq!(status, 403);
    assert_eq!(
        body["__type"].as_str(),
        Some("com.amazonaws.sqs#MissingAuthHeader")
    );
}

#[actix_web::test]
async fn test_signature_v2_is_rejected() {
    let (service, _tmpdir) = setup().await;
    let app = sqs_app!(service);

    let req = test::TestRequest::post()
        .uri("/")
        .insert_header(("X-Amz-Target", "AmazonSQS.ListQueues"))
        .insert_header(("Authorization", "AWS AKIDEXAMPLE:frJIUN8DYpKDtOLCwoyllqDzg="))
        .to_request();

    let (status, body) = call_raw!(app, req);
    assert_eq!(status, 403);
    assert_eq!(
        body["__type"].as_str(),
        Some("com.amazonaws.sqs#UnsupportedSignatureVersion")
    );
}

#[actix_web::test]
async fn test_unknown_access_key() {
    let (service, _tmpdir) = setup().await;
    let app = sqs_app!(service);

    let req = signed_request("AKIDNOBODY", "whatever", "AmazonSQS.ListQueues", "{}").to_request();

    let (status, body) = call_raw!(app, req);
    assert_eq!(status, 403);
    assert_eq!(
        body["__type"].as_str(),
        Some("com.amazonaws.sqs#UnknownAccessKey")
    );
}

#[actix_web::test]
async fn test_unknown_operation() {
    let (service, _tmpdir) = setup().await;
    let app = sqs_app!(service);

    let req = root_request("AmazonSQS.TeleportQueue", "{}").to_request();

    let (status, body) = call_raw!(app, req);
    assert_eq!(status, 400);
    assert_eq!(
        body["__type"].as_str(),
        Some("com.amazonaws.sqs#UnknownOperation")
    );
}

#[actix_web::test]
async fn test_delay_bounds_rejected_on_the_wire() {
    let (service, _tmpdir) = setup().await;
    let app = sqs_app!(service);

    let resp = test::call_service(
        &app,
        root_request("AmazonSQS.CreateQueue", r#"{"QueueName":"q1"}"#).to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    let queue_url = body["QueueUrl"].as_str().unwrap().to_owned();

    let send = json!({"QueueUrl": queue_url, "MessageBody": "x", "DelaySeconds": 901});
    let (status, body) = call_raw!(
        app,
        root_request("AmazonSQS.SendMessage", &send.to_string()).to_request()
    );
    assert_eq!(status, 400);
    assert_eq!(
        body["__type"].as_str(),
        Some("com.amazonaws.sqs#InvalidParameterValue")
    );
}

#[actix_web::test]
async fn test_tenant_segment_in_queue_url_is_informational() {
    let (service, _tmpdir) = setup().await;
    let app = sqs_app!(service);

    let resp = test::call_service(
        &app,
        root_request("AmazonSQS.CreateQueue", r#"{"QueueName":"q1"}"#).to_request(),
    )
    .await;
    assert!(resp.status().is_success());

    // Bogus tenant segment; the authenticated tenant wins.
    let send = json!({
        "QueueUrl": "https://sqs.us-east-1.amazonaws.com/424242/q1",
        "MessageBody": "hi"
    });
    let resp = test::call_service(
        &app,
        root_request("AmazonSQS.SendMessage", &send.to_string()).to_request(),
    )
    .await;
    assert!(resp.status().is_success());
}

#[actix_web::test]
async fn test_tenant_isolation_on_the_wire() {
    let (service, _tmpdir) = setup().await;
    service.create_tenant("AKIDOTHER", "other-secret").await.unwrap();

    let app = sqs_app!(service);

    let resp = test::call_service(
        &app,
        root_request("AmazonSQS.CreateQueue", r#"{"QueueName":"qA"}"#).to_request(),
    )
    .await;
    assert!(resp.status().is_success());

    // Tenant B sees no queues.
    let resp = test::call_service(
        &app,
        signed_request("AKIDOTHER", "other-secret", "AmazonSQS.ListQueues", "{}").to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert!(body["QueueUrls"].as_array().unwrap().is_empty());

    // Receiving from A's queue as B fails as if the queue did not exist.
    let receive = json!({
        "QueueUrl": "https://sqs.us-east-1.amazonaws.com/2/qA"
    });
    let (status, body) = call_raw!(
        app,
        signed_request(
            "AKIDOTHER",
            "other-secret",
            "AmazonSQS.ReceiveMessage",
            &receive.to_string(),
        )
        .to_request()
    );
    assert_eq!(status, 400);
    assert_eq!(
        body["__type"].as_str(),
        Some("com.amazonaws.sqs#QueueDoesNotExist")
    );
}

#[actix_web::test]
async fn test_get_queue_attributes() {
    let (service, _tmpdir) = setup().await;
    let app = sqs_app!(service);

    let resp = test::call_service(
        &app,
        root_request("AmazonSQS.CreateQueue", r#"{"QueueName":"q1"}"#).to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    let queue_url = body["QueueUrl"].as_str().unwrap().to_owned();

    let send = json!({"QueueUrl": queue_url, "MessageBody": "x"});
    test::call_service(
        &app,
        root_request("AmazonSQS.SendMessage", &send.to_string()).to_request(),
    )
    .await;

    let get = json!({"QueueUrl": queue_url, "AttributeNames": ["All"]});
    let resp = test::call_service(
        &app,
        root_request("AmazonSQS.GetQueueAttributes", &get.to_string()).to_request(),
    )
    .await;
    assert!(resp.status().is_success());
    let body: Value = test::read_body_json(resp).await;
    let attributes = &body["Attributes"];

    assert_eq!(attributes["ApproximateNumberOfMessages"].as_str(), Some("1"));
    assert_eq!(attributes["VisibilityTimeout"].as_str(), Some("30"));

    let get = json!({"QueueUrl": queue_url, "AttributeNames": ["VisibilityTimeout"]});
    let resp = test::call_service(
        &app,
        root_request("AmazonSQS.GetQueueAttributes", &get.to_string()).to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    let attributes = body["Attributes"].as_object().unwrap();
    assert_eq!(attributes.len(), 1);
    assert!(attributes.contains_key("VisibilityTimeout"));
}

#[actix_web::test]
async fn test_get_queue_url_and_purge() {
    let (service, _tmpdir) = setup().await;
    let app = sqs_app!(service);

    test::call_service(
        &app,
        root_request("AmazonSQS.CreateQueue", r#"{"QueueName":"q1"}"#).to_request(),
    )
    .await;

    let resp = test::call_service(
        &app,
        root_request("AmazonSQS.GetQueueUrl", r#"{"QueueName":"q1"}"#).to_request(),
    )
    .await;
    assert!(resp.status().is_success());
    let body: Value = test::read_body_json(resp).await;
    let queue_url = body["QueueUrl"].as_str().unwrap().to_owned();
    assert!(queue_url.ends_with("/q1"));

    let send = json!({"QueueUrl": queue_url, "MessageBody": "x"});
    test::call_service(
        &app,
        root_request("AmazonSQS.SendMessage", &send.to_string()).to_request(),
    )
    .await;

    let purge = json!({"QueueUrl": queue_url});
    let resp = test::call_service(
        &app,
        root_request("AmazonSQS.PurgeQueue", &purge.to_string()).to_request(),
    )
    .await;
    assert!(resp.status().is_success());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["Success"].as_bool(), Some(true));

    let receive = json!({"QueueUrl": queue_url});
    let resp = test::call_service(
        &app,
        root_request("AmazonSQS.ReceiveMessage", &receive.to_string()).to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert!(body["Messages"].as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn test_delete_queue_on_the_wire() {
    let (service, _tmpdir) = setup().await;
    let app = sqs_app!(service);

    test::call_service(
        &app,
        root_request("AmazonSQS.CreateQueue", r#"{"QueueName":"q1"}"#).to_request(),
    )
    .await;

    let delete = json!({"QueueUrl": "https://sqs.us-east-1.amazonaws.com/1/q1"});
    let resp = test::call_service(
        &app,
        root_request("AmazonSQS.DeleteQueue", &delete.to_string()).to_request(),
    )
    .await;
    assert!(resp.status().is_success());

    let resp = test::call_service(
        &app,
        root_request("AmazonSQS.ListQueues", "{}").to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    assert!(body["QueueUrls"].as_array().unwrap().is_empty());
}
