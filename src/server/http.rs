//! HTTP server implementation
//!
//! hyper http1 with TokioIo and manual dispatch. Two routing shapes share
//! the same handlers: path-addressed (`/<gci>/state`, multi-tenant) and
//! embedded (`/state` from inside an app page, where the chain is resolved
//! from the referring page's first path segment).
//!
//! Every response carries the caller's `userId` cookie identity; a request
//! without one is issued a fresh random identity that is used for that
//! same request.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderMap, COOKIE, REFERER, SET_COOKIE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use rand::RngCore;
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use url::Url;

use crate::chain::is_valid_gci;
use crate::error::{Result, WicketError};
use crate::routes;

use super::{AppState, GatewayHook};

/// Start the HTTP server
pub async fn run(state: Arc<AppState>, hooks: Vec<Box<dyn GatewayHook>>) -> Result<()> {
    for hook in &hooks {
        hook.on_init(&state);
    }

    let listener = TcpListener::bind(state.args.listen).await?;
    info!(
        "Wicket listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    for hook in &hooks {
        hook.on_listen(state.args.listen);
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("[{}] {} {}", addr, method, path);

    let (user_id, issued) = match cookie_user_id(req.headers()) {
        Some(id) => (id, false),
        None => (issue_user_id(), true),
    };

    let mut response = dispatch(&state, method, &path, &user_id, req)
        .await
        .unwrap_or_else(|err| routes::error_response(&err));

    if issued {
        let cookie = format!("userId={}; Path=/; HttpOnly; SameSite=Lax", user_id);
        if let Ok(value) = cookie.parse() {
            response.headers_mut().insert(SET_COOKIE, value);
        }
    }

    Ok(response)
}

async fn dispatch(
    state: &AppState,
    method: Method,
    path: &str,
    user_id: &str,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>> {
    let query = req.uri().query().map(str::to_string);
    let referer = header_str(req.headers(), REFERER);

    match (method, path) {
        (Method::OPTIONS, _) => preflight_response(),

        (Method::GET, "/") => landing_page(),
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            routes::health::health(state).await
        }
        (Method::GET, "/version") => routes::health::version(),

        // Registered protocol handler entry point: the browser substitutes
        // the full web+chain URI into the ?uri= template
        (Method::GET, "/launch") => {
            let uri = query_param(query.as_deref(), "uri").ok_or_else(|| {
                WicketError::BadRequest("missing uri parameter".into())
            })?;
            let gci = launch_gci(&uri)?;
            redirect_response(&format!("/{}/", gci))
        }

        // Embedded routes: the chain comes from the referring app page
        (Method::GET, "/state") => {
            let gci = referer_gci(referer.as_deref())?;
            let state_path = query_param(query.as_deref(), "path").unwrap_or_default();
            routes::chain::get_state(state, &gci, &state_path).await
        }
        (Method::POST, "/send") => {
            let gci = referer_gci(referer.as_deref())?;
            let body = read_body(req).await?;
            routes::chain::send_tx(state, &gci, &body).await
        }

        // Path-addressed routes: /<gci>/<operation or asset>
        (method, path) => {
            let (gci, rest) = split_gci_path(path)?;
            match (method, rest.as_str()) {
                (Method::GET, "state") => {
                    let state_path = query_param(query.as_deref(), "path").unwrap_or_default();
                    routes::chain::get_state(state, &gci, &state_path).await
                }
                (Method::POST, "send") => {
                    let body = read_body(req).await?;
                    routes::chain::send_tx(state, &gci, &body).await
                }
                (Method::GET, "keys") => routes::keys::public_key(state, &gci, user_id).await,
                (Method::POST, "sign") => {
                    let body = read_body(req).await?;
                    routes::keys::sign(state, &gci, user_id, referer.as_deref(), &body).await
                }
                (Method::GET, asset) => routes::bundle::serve(state, &gci, asset).await,
                _ => Err(WicketError::NotFound(format!("no route for {}", path))),
            }
        }
    }
}

/// Collect the request body
async fn read_body(req: Request<Incoming>) -> Result<Bytes> {
    req.collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| WicketError::BadRequest(format!("request body: {}", e)))
}

fn header_str(headers: &HeaderMap, name: hyper::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// `userId` value from the Cookie header, if present
fn cookie_user_id(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|part| {
        part.trim()
            .strip_prefix("userId=")
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

/// Fresh random cookie identity
fn issue_user_id() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Resolve a chain identifier from the referring page's first path segment
fn referer_gci(referer: Option<&str>) -> Result<String> {
    let referer = referer.ok_or_else(|| {
        WicketError::Routing("cannot resolve a chain without a referring page".into())
    })?;

    let url = Url::parse(referer)
        .map_err(|e| WicketError::Routing(format!("invalid referring page URL: {}", e)))?;

    url.path_segments()
        .and_then(|mut segments| segments.next())
        .filter(|s| is_valid_gci(s))
        .map(str::to_string)
        .ok_or_else(|| {
            WicketError::Routing("referring page does not name a chain".into())
        })
}

/// Split `/<gci>/<rest...>` into its chain identifier and remainder
fn split_gci_path(path: &str) -> Result<(String, String)> {
    let trimmed = path.trim_start_matches('/');
    let (gci, rest) = match trimmed.split_once('/') {
        Some((gci, rest)) => (gci, rest),
        None => (trimmed, ""),
    };
    if !is_valid_gci(gci) {
        return Err(WicketError::NotFound(format!("no route for /{}", trimmed)));
    }
    Ok((gci.to_string(), rest.to_string()))
}

/// Decode one query parameter
fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Chain identifier out of a `web+chain:` URI from the protocol handler
fn launch_gci(uri: &str) -> Result<String> {
    let rest = uri.strip_prefix("web+chain:").ok_or_else(|| {
        WicketError::Routing(format!("not a web+chain URI: {}", uri))
    })?;
    let gci = rest.trim_matches('/');
    if is_valid_gci(gci) {
        Ok(gci.to_string())
    } else {
        Err(WicketError::Routing(format!(
            "web+chain URI does not name a chain: {}",
            uri
        )))
    }
}

/// Redirect to a gateway-local path
fn redirect_response(location: &str) -> Result<Response<Full<Bytes>>> {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(hyper::header::LOCATION, location)
        .body(Full::new(Bytes::new()))
        .map_err(|e| WicketError::Internal(format!("response build: {}", e)))
}

/// CORS preflight response
fn preflight_response() -> Result<Response<Full<Bytes>>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .body(Full::new(Bytes::new()))
        .map_err(|e| WicketError::Internal(format!("response build: {}", e)))
}

/// Landing page with the protocol-handler registration snippet
fn landing_page() -> Result<Response<Full<Bytes>>> {
    const PAGE: &str = r#"<!doctype html>
<html>
  <head><meta charset="utf-8"><title>wicket</title></head>
  <body>
    <h1>wicket</h1>
    <p>Browser gateway for content-addressed application chains.
       Open <code>/&lt;chain-id&gt;/</code> to use a chain's app.</p>
    <script>
      if (navigator.registerProtocolHandler) {
        try { navigator.registerProtocolHandler('web+chain', '/launch?uri=%s'); } catch (e) {}
      }
    </script>
  </body>
</html>
"#;
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/html; charset=utf-8")
        .body(Full::new(Bytes::from_static(PAGE.as_bytes())))
        .map_err(|e| WicketError::Internal(format!("response build: {}", e)))
}
