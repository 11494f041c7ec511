//! Request extractors.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use persona_core::{VoterId, VoterSource};

/// Anonymous voter derived from the request's address and user agent.
///
/// Never fails: a request with no usable address still maps to the
/// `anonymous` voter.
#[derive(Debug, Clone)]
pub struct Voter(pub VoterId);

impl<S> FromRequestParts<S> for Voter
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let source = VoterSource {
            forwarded_for: header_str(headers, "x-forwarded-for"),
            real_ip: header_str(headers, "x-real-ip"),
            peer_addr: parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string()),
            user_agent: header_str(headers, header::USER_AGENT.as_str()),
        };

        Ok(Self(VoterId::resolve(&source)))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
