use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{header::HeaderMap, header::HeaderValue, Body, Client, RequestBuilder, Response};

use super::codec::{encode_message, parse_trailer, FrameDecoder};
use super::{CallError, Duplex, Frame, FrameStream, Status, Transport};
use crate::context::Context;

/// Path segment every method lives under
pub const SERVICE_PATH: &str = "threads.net.API";
const CONTENT_TYPE: &str = "application/grpc-web+bincode";

/// Transport options; nothing is limited by default
#[derive(Debug, Clone, Default)]
pub struct HttpConfig {
    pub connect_timeout: Option<Duration>,
    /// Applies to unary calls only, streams stay open until closed
    pub request_timeout: Option<Duration>,
    /// Speak HTTP/2 without negotiation, needed for duplex calls over cleartext
    pub http2_prior_knowledge: bool,
    /// Log every frame
    pub debug: bool,
}

/// gRPC-web over HTTP
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: HttpConfig,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Result<Self, reqwest::Error> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert("content-type", HeaderValue::from_static(CONTENT_TYPE));
        default_headers.insert("x-grpc-web", HeaderValue::from_static("1"));

        let mut builder = Client::builder().default_headers(default_headers);
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if config.http2_prior_knowledge {
            builder = builder.http2_prior_knowledge();
        }
        let client = builder.build()?;

        Ok(Self { client, config })
    }

    fn request(&self, ctx: &Context, method: &str) -> Result<RequestBuilder, CallError> {
        let host = ctx
            .host
            .as_ref()
            .ok_or_else(|| CallError::Transport("no host configured".into()))?;
        let url = format!(
            "{}/{}/{}",
            host.as_str().trim_end_matches('/'),
            SERVICE_PATH,
            method
        );
        let url = reqwest::Url::parse(&url).map_err(|e| CallError::Transport(e.to_string()))?;

        let mut builder = self.client.post(url);
        for (name, value) in ctx.metadata() {
            builder = builder.header(name, value);
        }
        Ok(builder)
    }

    fn debug(&self, ctx: &Context) -> bool {
        self.config.debug || ctx.is_debug()
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, CallError> {
        let response = builder.send().await.map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(CallError::Transport(format!(
                "unexpected http status {}",
                response.status()
            )));
        }
        Ok(response)
    }
}

fn transport_error(err: reqwest::Error) -> CallError {
    CallError::Transport(err.to_string())
}

/// Status sent in headers by a trailers-only response
fn header_status(headers: &HeaderMap) -> Result<Option<Status>, CallError> {
    if !headers.contains_key("grpc-status") {
        return Ok(None);
    }
    let lines = ["grpc-status", "grpc-message"].into_iter().filter_map(|name| {
        let value = headers.get(name)?.to_str().ok()?;
        Some((name, value))
    });
    parse_trailer(lines)
        .map(Some)
        .map_err(|e| CallError::Transport(e.to_string()))
}

/// Decode a streamed response body into `out` until a terminal frame
async fn pump_frames(response: Response, out: flume::Sender<Frame>, debug: bool) {
    match header_status(response.headers()) {
        Ok(Some(status)) => {
            let _ = out.send_async(Frame::End(status)).await;
            return;
        }
        Ok(None) => {}
        Err(e) => {
            let _ = out.send_async(Frame::Broken(e.to_string())).await;
            return;
        }
    }

    let mut body = response.bytes_stream();
    let mut decoder = FrameDecoder::new();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(chunk) => decoder.push(&chunk),
            Err(e) => {
                let _ = out.send_async(Frame::Broken(e.to_string())).await;
                return;
            }
        }
        loop {
            let frame = match decoder.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    let _ = out.send_async(Frame::Broken(e.to_string())).await;
                    return;
                }
            };
            if debug {
                tracing::debug!("received frame: {:?}", frame);
            }
            let terminal = !matches!(frame, Frame::Message(_));
            // receiver gone means the caller closed the stream
            if out.send_async(frame).await.is_err() || terminal {
                return;
            }
        }
    }
    let _ = out
        .send_async(Frame::Broken("stream ended without status".into()))
        .await;
}

#[async_trait]
impl Transport for HttpTransport {
    async fn unary(&self, ctx: &Context, method: &str, payload: Bytes) -> Result<Bytes, CallError> {
        let mut builder = self.request(ctx, method)?.body(encode_message(&payload));
        if let Some(timeout) = self.config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let response = self.send(builder).await?;

        if let Some(status) = header_status(response.headers())? {
            if status.is_ok() {
                return Ok(Bytes::new());
            }
            return Err(CallError::Status(status));
        }

        let body = response.bytes().await.map_err(transport_error)?;
        let mut decoder = FrameDecoder::new();
        decoder.push(&body);

        let mut message = None;
        loop {
            let frame = decoder
                .next_frame()
                .map_err(|e| CallError::Transport(e.to_string()))?;
            if self.debug(ctx) {
                tracing::debug!("{} frame: {:?}", method, frame);
            }
            match frame {
                Some(Frame::Message(bytes)) => {
                    message.get_or_insert(bytes);
                }
                Some(Frame::End(status)) if status.is_ok() => {
                    return Ok(message.unwrap_or_default());
                }
                Some(Frame::End(status)) => return Err(CallError::Status(status)),
                Some(Frame::Broken(msg)) => return Err(CallError::Transport(msg)),
                None => {
                    return Err(CallError::Transport(
                        "response ended without status".into(),
                    ))
                }
            }
        }
    }

    async fn server_stream(
        &self,
        ctx: &Context,
        method: &str,
        payload: Bytes,
    ) -> Result<FrameStream, CallError> {
        let builder = self.request(ctx, method)?.body(encode_message(&payload));
        let response = self.send(builder).await?;

        let (tx, rx) = flume::bounded(64);
        tokio::spawn(pump_frames(response, tx, self.debug(ctx)));
        Ok(rx)
    }

    async fn duplex(&self, ctx: &Context, method: &str) -> Result<Duplex, CallError> {
        let (sender, outgoing) = flume::unbounded::<Bytes>();
        let body = Body::wrap_stream(
            outgoing
                .into_stream()
                .map(|message| Ok::<_, std::io::Error>(encode_message(&message))),
        );
        let builder = self.request(ctx, method)?.body(body);

        let (tx, frames) = flume::bounded(64);
        let transport = self.clone();
        let debug = self.debug(ctx);
        tokio::spawn(async move {
            match transport.send(builder).await {
                Ok(response) => pump_frames(response, tx, debug).await,
                Err(e) => {
                    let _ = tx.send_async(Frame::Broken(e.to_string())).await;
                }
            }
        });

        Ok(Duplex { sender, frames })
    }
}
