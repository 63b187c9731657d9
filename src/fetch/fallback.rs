//! Pin-instead-of-download fallback
//!
//! Gateway URLs of the form `/ipfs/<cid>/...` name content the node can often
//! reach over its own peer network. When downloading such a URL fails we pin
//! the embedded address rather than spending bandwidth on a second download.
//! Every branch ends in either a result or one final plain download attempt.

use super::{ContentFetcher, Result, StoredContent, pin_and_resolve};
use tracing::{error, info, warn};
use url::Url;

pub const CONTENT_PATH_PREFIX: &str = "/ipfs/";

/// CIDv0 addresses are base58btc multihashes of fixed width
const CID_V0_LEN: usize = 46;

const BASE58_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Content address embedded right after [`CONTENT_PATH_PREFIX`], if well formed
pub fn embedded_content_address(path: &str) -> Option<&str> {
    let rest = path.strip_prefix(CONTENT_PATH_PREFIX)?;
    let candidate = rest.get(..CID_V0_LEN)?;

    let well_formed =
        candidate.starts_with("Qm") && candidate.bytes().all(|b| BASE58_ALPHABET.contains(&b));

    well_formed.then_some(candidate)
}

impl ContentFetcher {
    /// Download `url`, falling back to pinning its embedded content address
    pub async fn fetch_or_pin(&self, url: &str, filename: &str) -> Result<StoredContent> {
        let err = match self.fetch_and_store(url, filename).await {
            Ok(stored) => return Ok(stored),
            Err(e) => e,
        };

        warn!(url, error = %err, "Download failed, trying pin");

        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                info!(url, error = %e, "Download URL does not parse, retrying download");
                return self.fetch_and_store(url, filename).await;
            }
        };

        if !parsed.path().starts_with(CONTENT_PATH_PREFIX) {
            return self.fetch_and_store(url, filename).await;
        }

        let Some(address) = embedded_content_address(parsed.path()) else {
            info!(url, "No content address in download URL, retrying download");
            return self.fetch_and_store(url, filename).await;
        };

        info!(url, address, "Found content address, pinning instead of downloading");

        match pin_and_resolve(self.node.as_ref(), address).await {
            Ok(pinned) => Ok(pinned),
            Err(e) => {
                error!(url, address, error = %e, "Pin instead of download failed");
                self.fetch_and_store(url, filename).await
            }
        }
    }
}
