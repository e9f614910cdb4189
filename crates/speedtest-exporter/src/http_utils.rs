// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{header, http, Response, StatusCode};
use tracing::{debug, error};

pub type HttpResponse = Response<Full<Bytes>>;

pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Does two things:
/// 1. Logs the given message. A success or client error status code causes a debug log to be
///    written, a server error status code an error log.
/// 2. Returns the given message as the plain text body of a response with the given status code.
pub fn log_and_create_http_response(message: &str, status: StatusCode) -> http::Result<HttpResponse> {
    if status.is_server_error() {
        error!("{}", message.trim_end());
    } else {
        debug!("{}", message.trim_end());
    }
    create_http_response(message.to_string(), TEXT_CONTENT_TYPE, status)
}

pub fn create_http_response(
    body: String,
    content_type: &str,
    status: StatusCode,
) -> http::Result<HttpResponse> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .body(Full::new(Bytes::from(body)))
}
