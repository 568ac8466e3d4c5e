use anyhow::Context;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use url::Url;

const MAX_REQUEST_HEAD: usize = 8192;

/// What the browser brought back on the redirect URI.
#[derive(Debug, PartialEq, Eq)]
enum Callback {
    Code(String),
    Denied {
        error: String,
        description: Option<String>,
    },
    MissingCode,
}

/// Requests that are not the login redirect, such as a favicon fetch.
#[derive(Debug, PartialEq, Eq)]
enum Stray {
    Method,
    Path,
    Malformed,
}

impl Stray {
    fn response(&self) -> (u16, &'static str, &'static str) {
        match self {
            Self::Method => (405, "Method Not Allowed", "Only GET is supported."),
            Self::Path => (404, "Not Found", "Not the login callback."),
            Self::Malformed => (400, "Bad Request", "Unreadable request."),
        }
    }
}

/// Listens on the redirect URI until the login redirect arrives and returns
/// its authorization code. Stray requests are answered and ignored.
pub(crate) async fn wait_for_code(redirect_uri: &Url) -> anyhow::Result<String> {
    if redirect_uri.scheme() != "http" {
        anyhow::bail!("redirect URI must use http for the local callback listener");
    }
    let host = redirect_uri
        .host_str()
        .context("redirect URI must include host")?;
    let port = redirect_uri
        .port_or_known_default()
        .context("redirect URI must include a valid port")?;

    let listener = TcpListener::bind((host, port))
        .await
        .with_context(|| format!("failed to bind callback listener on {host}:{port}"))?;

    loop {
        let (mut stream, peer) = listener.accept().await.context("failed to accept callback")?;
        let head = read_request_head(&mut stream)
            .await
            .context("failed to read callback request")?;

        let callback = match parse_callback(&head, redirect_uri) {
            Ok(callback) => callback,
            Err(stray) => {
                log::debug!("ignoring {stray:?} request from {peer}");
                let (status, reason, body) = stray.response();
                respond(&mut stream, status, reason, body).await?;
                continue;
            }
        };

        return match callback {
            Callback::Code(code) => {
                respond(&mut stream, 200, "OK", "Login captured. You can close this tab.").await?;
                Ok(code)
            }
            Callback::Denied { error, description } => {
                respond(&mut stream, 400, "Bad Request", "Login was not completed.").await?;
                match description {
                    Some(description) => anyhow::bail!("login denied: {error} ({description})"),
                    None => anyhow::bail!("login denied: {error}"),
                }
            }
            Callback::MissingCode => {
                respond(&mut stream, 400, "Bad Request", "Missing code query parameter.").await?;
                anyhow::bail!("callback carried no authorization code")
            }
        };
    }
}

fn parse_callback(head: &str, redirect_uri: &Url) -> Result<Callback, Stray> {
    let request_line = head.lines().next().ok_or(Stray::Malformed)?;
    let (method, rest) = request_line.split_once(' ').ok_or(Stray::Malformed)?;
    let target = rest.split(' ').next().ok_or(Stray::Malformed)?;
    if method != "GET" {
        return Err(Stray::Method);
    }

    let target = redirect_uri.join(target).map_err(|_| Stray::Malformed)?;
    if target.path() != redirect_uri.path() {
        return Err(Stray::Path);
    }

    let param = |name: &str| {
        target
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
    };

    Ok(match (param("code"), param("error")) {
        (Some(code), _) => Callback::Code(code),
        (None, Some(error)) => Callback::Denied {
            error,
            description: param("error_description"),
        },
        (None, None) => Callback::MissingCode,
    })
}

async fn read_request_head(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut head = Vec::with_capacity(1024);
    let mut chunk = [0_u8; 1024];
    while head.len() < MAX_REQUEST_HEAD && !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..read]);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

async fn respond(
    stream: &mut TcpStream,
    status: u16,
    reason: &str,
    body: &str,
) -> anyhow::Result<()> {
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream
        .write_all(response.as_bytes())
        .await
        .context("failed writing callback response")?;
    stream.shutdown().await.ok();
    Ok(())
}
