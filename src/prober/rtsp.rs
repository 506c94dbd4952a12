//! RTSP `DESCRIBE` connector.
use super::{ProbeConnector, ProbeResponse};
use crate::prober::candidates::ProbeCandidate;
use base64::Engine as _;
use futures::future::BoxFuture;
use log::debug;
use std::net::SocketAddr;
use tokio::io::{self, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Upper bound on what we read back from a camera.
const MAX_RESPONSE_BYTES: usize = 16 * 1024;
const USER_AGENT: &str = concat!("fleetscout/", env!("CARGO_PKG_VERSION"));

/// Validates stream paths by issuing one `DESCRIBE` per candidate over a
/// fresh TCP connection.
///
/// Credentials are sent with HTTP Basic authentication. Cameras that insist
/// on Digest answer `401`, which is recorded as a failed attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct RtspConnector;

impl RtspConnector {
    async fn describe(target: SocketAddr, candidate: &ProbeCandidate) -> io::Result<ProbeResponse> {
        let mut stream = TcpStream::connect(target).await?;
        let request = build_describe(&candidate.uri(target), candidate);
        stream.write_all(request.as_bytes()).await?;

        let mut buf = Vec::with_capacity(2048);
        let mut chunk = [0u8; 2048];
        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if buf.len() >= MAX_RESPONSE_BYTES || response_complete(&buf) {
                break;
            }
        }

        if let Err(e) = stream.shutdown().await {
            debug!("Shutdown stream error {}", &e);
        }

        let text = String::from_utf8_lossy(&buf);
        parse_response(&text).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "not an RTSP response")
        })
    }
}

impl ProbeConnector for RtspConnector {
    fn probe<'a>(
        &'a self,
        target: SocketAddr,
        candidate: &'a ProbeCandidate,
    ) -> BoxFuture<'a, io::Result<ProbeResponse>> {
        Box::pin(Self::describe(target, candidate))
    }
}

fn build_describe(uri: &str, candidate: &ProbeCandidate) -> String {
    let mut request = format!(
        "DESCRIBE {uri} RTSP/1.0\r\nCSeq: 2\r\nAccept: application/sdp\r\nUser-Agent: {USER_AGENT}\r\n"
    );
    if let Some(credential) = &candidate.credential {
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", credential.username, credential.password));
        request.push_str(&format!("Authorization: Basic {token}\r\n"));
    }
    request.push_str("\r\n");
    request
}

/// True once the header block and the advertised body have both arrived.
fn response_complete(buf: &[u8]) -> bool {
    let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let headers = String::from_utf8_lossy(&buf[..header_end]);
    let body_len = header_value(&headers, "content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    buf.len() >= header_end + 4 + body_len
}

fn header_value<'a>(headers: &'a str, name: &str) -> Option<&'a str> {
    headers.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then_some(value.trim())
    })
}

/// Parses the status line, `Server` banner and SDP codec hints out of a raw
/// RTSP response.
pub(crate) fn parse_response(text: &str) -> Option<ProbeResponse> {
    let (head, body) = text.split_once("\r\n\r\n").unwrap_or((text, ""));
    let status_line = head.lines().next()?;
    let mut parts = status_line.split_whitespace();
    if !parts.next()?.starts_with("RTSP/") {
        return None;
    }
    let status = parts.next()?.parse::<u16>().ok()?;
    let reason = parts.collect::<Vec<_>>().join(" ");

    let server = header_value(head, "server").map(str::to_owned);
    let codecs = codec_hints(body);

    Some(ProbeResponse {
        status,
        reason,
        server,
        codecs,
    })
}

/// Encoding names from `a=rtpmap` lines, e.g. `H264`, `H265`, `PCMA`.
fn codec_hints(sdp: &str) -> Vec<String> {
    let mut codecs = Vec::new();
    for line in sdp.lines() {
        let Some(map) = line.trim().strip_prefix("a=rtpmap:") else {
            continue;
        };
        let Some(encoding) = map
            .split_whitespace()
            .nth(1)
            .and_then(|e| e.split('/').next())
        else {
            continue;
        };
        let encoding = encoding.to_ascii_uppercase();
        if !codecs.contains(&encoding) {
            codecs.push(encoding);
        }
    }
    codecs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prober::candidates::Credential;
    use tokio::net::TcpListener;

    const OK_RESPONSE: &str = "RTSP/1.0 200 OK\r\n\
        CSeq: 2\r\n\
        Server: Hipcam RealServer/V1.0\r\n\
        Content-Type: application/sdp\r\n\
        Content-Length: 120\r\n\r\n\
        v=0\r\n\
        m=video 0 RTP/AVP 96\r\n\
        a=rtpmap:96 H264/90000\r\n\
        m=audio 0 RTP/AVP 8\r\n\
        a=rtpmap:8 PCMA/8000/1\r\n\
        a=rtpmap:97 h264/90000\r\n";

    #[test]
    fn parses_status_banner_and_codecs() {
        let response = parse_response(OK_RESPONSE).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.reason, "OK");
        assert_eq!(response.server.as_deref(), Some("Hipcam RealServer/V1.0"));
        assert_eq!(response.codecs, ["H264", "PCMA"]);
    }

    #[test]
    fn parses_unauthorized() {
        let response =
            parse_response("RTSP/1.0 401 Unauthorized\r\nCSeq: 2\r\nWWW-Authenticate: Digest realm=\"x\"\r\n\r\n")
                .unwrap();
        assert_eq!(response.status, 401);
        assert!(!response.is_success());
    }

    #[test]
    fn rejects_non_rtsp() {
        assert!(parse_response("HTTP/1.1 200 OK\r\n\r\n").is_none());
        assert!(parse_response("").is_none());
    }

    #[test]
    fn describe_carries_basic_auth() {
        let candidate = ProbeCandidate::new("/stream1", Some(Credential::new("admin", "12345")));
        let request = build_describe("rtsp://10.0.0.2:554/stream1", &candidate);
        assert!(request.starts_with("DESCRIBE rtsp://10.0.0.2:554/stream1 RTSP/1.0\r\n"));
        assert!(request.contains("Authorization: Basic YWRtaW46MTIzNDU=\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[test]
    fn completeness_waits_for_body() {
        let (head, _) = OK_RESPONSE.split_at(OK_RESPONSE.len() - 10);
        assert!(!response_complete(head.as_bytes()));
        assert!(response_complete(OK_RESPONSE.as_bytes()));
    }

    #[tokio::test]
    async fn talks_to_a_local_rtsp_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            assert!(String::from_utf8_lossy(&buf[..n]).starts_with("DESCRIBE "));
            socket.write_all(OK_RESPONSE.as_bytes()).await.unwrap();
        });

        let candidate = ProbeCandidate::new("/stream1", None);
        let response = RtspConnector.probe(addr, &candidate).await.unwrap();

        assert!(response.is_success());
        assert_eq!(response.codecs, ["H264", "PCMA"]);
    }
}
