/// Origin address resolution
///
/// The transport-level peer address is authoritative. A forwarded header
/// is read only when the peer itself is a configured trusted proxy, and
/// then only its left-most entry (the client as seen by the first proxy).

use std::net::IpAddr;

use actix_web::HttpRequest;

use crate::configuration::OriginSettings;
use crate::error::AppError;

#[derive(Clone, Debug, Default)]
pub struct OriginPolicy {
    trusted_proxies: Vec<IpAddr>,
    forwarded_header: String,
}

impl OriginPolicy {
    pub fn new(trusted_proxies: Vec<IpAddr>, forwarded_header: impl Into<String>) -> Self {
        Self {
            trusted_proxies,
            forwarded_header: forwarded_header.into(),
        }
    }

    /// Resolve the origin of a request
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if the peer address is unknown or a
    /// trusted proxy forwarded an unparseable address
    pub fn resolve(&self, req: &HttpRequest) -> Result<IpAddr, AppError> {
        let peer = req
            .peer_addr()
            .map(|addr| addr.ip())
            .ok_or_else(|| AppError::BadRequest("peer address unavailable".to_string()))?;

        let forwarded = req
            .headers()
            .get(self.forwarded_header.as_str())
            .and_then(|h| h.to_str().ok());

        self.resolve_from(peer, forwarded)
    }

    fn resolve_from(&self, peer: IpAddr, forwarded: Option<&str>) -> Result<IpAddr, AppError> {
        if !self.trusted_proxies.contains(&peer) {
            return Ok(peer);
        }

        match forwarded.and_then(|value| value.split(',').next()).map(str::trim) {
            None | Some("") => Ok(peer),
            Some(client) => client.parse::<IpAddr>().map_err(|_| {
                tracing::warn!(proxy = %peer, forwarded = client, "Unparseable forwarded address");
                AppError::BadRequest("invalid forwarded address".to_string())
            }),
        }
    }
}

impl From<&OriginSettings> for OriginPolicy {
    fn from(settings: &OriginSettings) -> Self {
        Self::new(settings.trusted_proxies.clone(), settings.forwarded_header.clone())
    }
}
