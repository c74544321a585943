//! Shared utilities for integration testing.

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use organ_registry::config::schema::GrantConfig;
use organ_registry::http::HttpServer;
use organ_registry::lifecycle::{provision, Shutdown};
use organ_registry::security::Role;
use organ_registry::RegistryConfig;
use sdk_rust::RegistryClient;

pub const ADMIN: &str = "0xC417DE948427eCACf33C7681bF43aE843afE82Fb";
pub const DONOR_STORAGE: &str = "0xb0DE9570B4bB8AFE9fAAa9EB76212D30042Ff762";
pub const RECIPIENT_STORAGE: &str = "0x7031F09Df4d4ADbA89b462E50C81dd9Bec999b1D";
pub const HOSPITAL: &str = "0x6801fE16cCd31E5A23692940851B97Ab2D411A0F";

pub const ADMIN_TOKEN: &str = "admin-token";
pub const HOSPITAL_TOKEN: &str = "hospital-token";
pub const DONOR_TOKEN: &str = "donor-token";
pub const RECIPIENT_TOKEN: &str = "recipient-token";

/// A registry served on an ephemeral port.
pub struct TestRegistry {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    #[allow(dead_code)]
    pub config_updates: mpsc::UnboundedSender<RegistryConfig>,
}

impl TestRegistry {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self, token: &str) -> RegistryClient {
        RegistryClient::new(&self.base_url(), token)
    }
}

impl Drop for TestRegistry {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

fn grant(token: &str, role: Role, address: &str) -> GrantConfig {
    GrantConfig {
        token: token.into(),
        role,
        address: address.into(),
    }
}

/// Memory-ledger configuration with one token per role.
pub fn test_config() -> RegistryConfig {
    let mut config = RegistryConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.provisioning.admin = ADMIN.into();
    config.provisioning.donor_storage = DONOR_STORAGE.into();
    config.provisioning.recipient_storage = RECIPIENT_STORAGE.into();
    config.consistency.max_wait_ms = 200;
    config.access.grants = vec![
        grant(ADMIN_TOKEN, Role::Admin, ADMIN),
        grant(HOSPITAL_TOKEN, Role::Hospital, HOSPITAL),
        grant(DONOR_TOKEN, Role::DonorIntake, DONOR_STORAGE),
        grant(RECIPIENT_TOKEN, Role::RecipientIntake, RECIPIENT_STORAGE),
    ];
    config
}

pub async fn start_registry(config: RegistryConfig) -> TestRegistry {
    let (registry, grants) = provision(&config).await.unwrap();
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (config_updates, updates_rx) = mpsc::unbounded_channel();
    let server = HttpServer::new(config, registry, grants, shutdown.clone());

    tokio::spawn(async move {
        let _ = server.run(listener, updates_rx).await;
    });

    TestRegistry {
        addr,
        shutdown,
        config_updates,
    }
}

/// A registry with the test hospital already registered.
#[allow(dead_code)]
pub async fn start_with_hospital() -> TestRegistry {
    let registry = start_registry(test_config()).await;
    registry
        .client(ADMIN_TOKEN)
        .register_hospital(HOSPITAL, "General", "Springfield", "555-0100")
        .await
        .unwrap();
    registry
}
