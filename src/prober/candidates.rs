//! Provides a means to build the ordered list of probe candidates.
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Stream paths commonly exposed by consumer cameras and NVRs.
pub const DEFAULT_RTSP_PATHS: &[&str] = &[
    "/stream1",
    "/stream2",
    "/h264_stream",
    "/live",
    "/live/ch00_0",
    "/Streaming/Channels/101",
    "/cam/realmonitor?channel=1&subtype=0",
    "/videoMain",
    "/",
];

/// Username/password pair tried against a stream path.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// One path, optionally paired with a credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProbeCandidate {
    pub path: String,
    pub credential: Option<Credential>,
}

impl ProbeCandidate {
    pub fn new(path: &str, credential: Option<Credential>) -> Self {
        Self {
            path: normalize_path(path),
            credential,
        }
    }

    /// Stream URI for this candidate on `target`. Credentials are never
    /// embedded in the URI.
    pub fn uri(&self, target: SocketAddr) -> String {
        format!("rtsp://{target}{}", self.path)
    }
}

fn normalize_path(path: &str) -> String {
    let path = path.trim();
    if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    }
}

/// Represents how the candidate list is built.
#[derive(Debug)]
pub enum CandidateStrategy {
    /// Caller supplied the exact list.
    Manual(Vec<ProbeCandidate>),
    /// Every path tried anonymously, then with each credential.
    Matrix(CandidateMatrix),
}

/// Paths crossed with credentials.
#[derive(Debug)]
pub struct CandidateMatrix {
    paths: Vec<String>,
    credentials: Vec<Credential>,
}

impl CandidateStrategy {
    /// Picks a strategy. Missing or empty `paths` fall back to
    /// [`DEFAULT_RTSP_PATHS`].
    pub fn pick(paths: Option<Vec<String>>, credentials: Vec<Credential>) -> Self {
        let paths = paths
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_RTSP_PATHS.iter().map(|&p| p.to_owned()).collect());
        Self::Matrix(CandidateMatrix { paths, credentials })
    }

    /// Candidates in their stable probe order.
    ///
    /// For a matrix the path is the outer loop and the anonymous attempt comes
    /// first, so "best result" prefers the simplest working URI. Duplicates keep
    /// their first position.
    pub fn ordered(&self) -> Vec<ProbeCandidate> {
        let all = match self {
            Self::Manual(candidates) => candidates.clone(),
            Self::Matrix(matrix) => matrix
                .paths
                .iter()
                .flat_map(|path| {
                    std::iter::once(None)
                        .chain(matrix.credentials.iter().cloned().map(Some))
                        .map(move |credential| ProbeCandidate::new(path, credential))
                })
                .collect(),
        };

        let mut ordered: Vec<ProbeCandidate> = Vec::with_capacity(all.len());
        for candidate in all {
            if !ordered.contains(&candidate) {
                ordered.push(candidate);
            }
        }
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::{CandidateStrategy, Credential, ProbeCandidate, DEFAULT_RTSP_PATHS};

    #[test]
    fn matrix_is_path_major_with_anonymous_first() {
        let strategy = CandidateStrategy::pick(
            Some(vec!["stream1".to_owned(), "/stream2".to_owned()]),
            vec![Credential::new("admin", "admin")],
        );

        let uris = strategy
            .ordered()
            .into_iter()
            .map(|c| (c.path, c.credential.map(|c| c.username)))
            .collect::<Vec<_>>();

        assert_eq!(
            uris,
            vec![
                ("/stream1".to_owned(), None),
                ("/stream1".to_owned(), Some("admin".to_owned())),
                ("/stream2".to_owned(), None),
                ("/stream2".to_owned(), Some("admin".to_owned())),
            ]
        );
    }

    #[test]
    fn empty_paths_fall_back_to_defaults() {
        let strategy = CandidateStrategy::pick(Some(vec![]), vec![]);
        assert_eq!(strategy.ordered().len(), DEFAULT_RTSP_PATHS.len());
    }

    #[test]
    fn duplicates_keep_first_position() {
        let strategy = CandidateStrategy::Manual(vec![
            ProbeCandidate::new("/a", None),
            ProbeCandidate::new("/b", None),
            ProbeCandidate::new("a", None),
        ]);
        let paths = strategy
            .ordered()
            .into_iter()
            .map(|c| c.path)
            .collect::<Vec<_>>();
        assert_eq!(paths, ["/a", "/b"]);
    }

    #[test]
    fn uri_brackets_ipv6_and_hides_credentials() {
        let candidate = ProbeCandidate::new("/live", Some(Credential::new("u", "secret")));
        assert_eq!(
            candidate.uri("[::1]:8554".parse().unwrap()),
            "rtsp://[::1]:8554/live"
        );
        assert!(!format!("{candidate:?}").contains("secret"));
    }
}
