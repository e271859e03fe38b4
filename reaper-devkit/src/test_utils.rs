/*!
Test Harness pour le client Reaper

Facilite l'écriture de tests d'intégration avec:
- Démarrage automatique d'un `StubReaper`
- Client déjà configuré vers le stub
- Initialisation du logging des tests
*/

use crate::payload_builders::StatusBuilder;
use crate::reaper_stub::StubReaper;
use anyhow::Result;
use reaper_client::{ClientConfig, ReaperClient};

/// Active les logs `tracing` dans la sortie des tests (idempotent)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// URL d'un port local où rien n'écoute
pub fn unused_local_url() -> Result<String> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{addr}"))
}

/// Stub + client pointé dessus
pub struct TestHarness {
    pub stub: StubReaper,
    pub client: ReaperClient,
}

impl TestHarness {
    pub async fn start() -> Result<Self> {
        Self::start_with(|config| config).await
    }

    /// Variante où le test ajuste la configuration du client
    pub async fn start_with<F>(configure: F) -> Result<Self>
    where
        F: FnOnce(ClientConfig) -> ClientConfig,
    {
        init_tracing();
        let stub = StubReaper::start().await?;
        let client = ReaperClient::new(configure(ClientConfig::new(stub.base_url())))?;
        Ok(Self { stub, client })
    }

    /// Enregistre des clusters à deux datacenters, dans l'ordre donné
    pub fn seed_clusters(&self, names: &[&str]) {
        for name in names {
            let status = StatusBuilder::new(name)
                .seed("10.0.0.1")
                .uniform(2, &["dc1", "dc2"], 1, 3)
                .build();
            self.stub.insert_cluster(status);
        }
    }
}

/// Macro pour écrire un test contre un stub déjà démarré
#[macro_export]
macro_rules! stub_test {
    ($name:ident, |$harness:ident| $body:block) => {
        #[tokio::test]
        async fn $name() -> anyhow::Result<()> {
            let $harness = $crate::test_utils::TestHarness::start().await?;
            $body
        }
    };
}
