use sone_core::{ContentId, FetchError, Fetched, KeyPair};
use tracing::{debug, warn};

use crate::NetworkInterface;

impl NetworkInterface {
    /// Fetches the content at `id`, following permanent redirects.
    ///
    /// Returns `None` if the fetch fails for any other reason; the failure
    /// is logged. There is no limit on the number of redirects.
    pub async fn fetch_uri(&self, id: &ContentId) -> Option<Fetched> {
        let mut current = id.clone();
        loop {
            match self.network.fetch(&current).await {
                Ok(result) => return Some(Fetched::new(current, result)),
                Err(FetchError::PermanentRedirect(next)) => {
                    debug!("following permanent redirect from {current} to {next}");
                    current = next;
                }
                Err(err) => {
                    warn!("could not fetch {current}: {err}");
                    return None;
                }
            }
        }
    }

    /// Generates a fresh insert/request identifier pair.
    pub fn generate_key_pair(&self) -> KeyPair {
        self.network.generate_key_pair()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sone_core::FetchResult;

    use crate::mock::{MockNetwork, interface};

    fn id(s: &str) -> sone_core::ContentId {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn fetches_directly() {
        let network = Arc::new(MockNetwork::new());
        network.respond(
            id("KSK@GPLv3.txt"),
            Ok(FetchResult::new("text/plain", &b"Some Data."[..])),
        );
        let interface = interface(network.clone());

        let fetched = interface.fetch_uri(&id("KSK@GPLv3.txt")).await.unwrap();
        assert_eq!(fetched.id(), &id("KSK@GPLv3.txt"));
        assert_eq!(fetched.result().content_type, "text/plain");
        assert_eq!(&fetched.result().data[..], b"Some Data.");
        assert_eq!(network.fetched(), vec![id("KSK@GPLv3.txt")]);
    }

    #[tokio::test]
    async fn follows_redirects() {
        let network = Arc::new(MockNetwork::new());
        network.respond(
            id("KSK@GPLv2.txt"),
            Err(sone_core::FetchError::PermanentRedirect(id("KSK@GPLv3.txt"))),
        );
        network.respond(
            id("KSK@GPLv3.txt"),
            Ok(FetchResult::new("text/plain", &b"Some Data."[..])),
        );
        let interface = interface(network.clone());

        let fetched = interface.fetch_uri(&id("KSK@GPLv2.txt")).await.unwrap();
        assert_eq!(fetched.id(), &id("KSK@GPLv3.txt"));
        assert_eq!(&fetched.result().data[..], b"Some Data.");
        assert_eq!(
            network.fetched(),
            vec![id("KSK@GPLv2.txt"), id("KSK@GPLv3.txt")]
        );
    }

    #[tokio::test]
    async fn other_failures_yield_none() {
        let network = Arc::new(MockNetwork::new());
        network.respond(
            id("KSK@GPLv3.txt"),
            Err(sone_core::FetchError::RouteNotFound),
        );
        let interface = interface(network.clone());

        assert!(interface.fetch_uri(&id("KSK@GPLv3.txt")).await.is_none());
        assert_eq!(network.fetched().len(), 1);
    }

    #[tokio::test]
    async fn key_pairs_come_from_the_network() {
        let network = Arc::new(MockNetwork::new());
        let interface = interface(network.clone());

        let pair = interface.generate_key_pair();
        assert_eq!(pair.insert_id.to_string(), "SSK@insert-1");
        assert_eq!(pair.request_id.to_string(), "SSK@request-1");
    }
}
