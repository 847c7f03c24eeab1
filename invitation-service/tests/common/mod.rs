use invitation_service::config::{
    InvitationConfig, InviteConfig, JwtConfig, MongoConfig, SmtpConfig,
};
use invitation_service::models::{Organization, Role, User};
use invitation_service::services::{InMemoryStore, JwtService, MockNotifier};
use invitation_service::startup::Application;
use service_core::config::Config as CoreConfig;
use std::sync::Arc;

pub struct TestApp {
    pub address: String,
    pub store: Arc<InMemoryStore>,
    pub notifier: Arc<MockNotifier>,
    pub jwt: JwtService,
    pub org_id: String,
    pub other_org_id: String,
    pub super_admin_role_id: String,
    pub org_admin_role_id: String,
    pub hr_role_id: String,
    pub viewer_role_id: String,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(false).await
    }

    pub async fn spawn_with(allow_member_invites: bool) -> Self {
        let config = InvitationConfig {
            common: CoreConfig {
                port: 0,
                environment: "dev".to_string(),
            },
            mongodb: MongoConfig {
                uri: "mongodb://unused".to_string(),
                database: "unused".to_string(),
            },
            smtp: SmtpConfig {
                host: "smtp.test.local".to_string(),
                port: 587,
                user: "test".to_string(),
                password: "test".to_string(),
                from_email: "test@example.com".to_string(),
                from_name: "Test Service".to_string(),
                enabled: false,
            },
            jwt: JwtConfig {
                secret: "integration-test-secret".to_string(),
                access_token_expiry_minutes: 15,
                refresh_token_expiry_days: 30,
            },
            invitations: InviteConfig {
                base_url: "http://localhost:8080".to_string(),
                allow_member_invites,
            },
        };

        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(MockNotifier::new());
        let jwt = JwtService::new(&config.jwt);

        let org = Organization::new("Acme".to_string());
        let org_id = org.organization_id.clone();
        let other_org = Organization::new("Globex".to_string());
        let other_org_id = other_org.organization_id.clone();
        store.seed_organization(org);
        store.seed_organization(other_org);

        let super_admin = Role::new(None, "super_admin".to_string(), Vec::new());
        let super_admin_role_id = super_admin.role_id.clone();
        let org_admin = Role::new(Some(org_id.clone()), "org_admin".to_string(), Vec::new());
        let org_admin_role_id = org_admin.role_id.clone();
        let hr = Role::new(
            Some(org_id.clone()),
            "hr_manager".to_string(),
            vec!["invite_users".to_string()],
        );
        let hr_role_id = hr.role_id.clone();
        let viewer = Role::new(
            Some(org_id.clone()),
            "viewer".to_string(),
            vec!["billing_read".to_string()],
        );
        let viewer_role_id = viewer.role_id.clone();
        store.seed_role(super_admin);
        store.seed_role(org_admin);
        store.seed_role(hr);
        store.seed_role(viewer);

        // A pre-existing account used by the email-conflict tests.
        store.seed_user(User::provisioned(
            "existing@acme.test".to_string(),
            Some("existing".to_string()),
            "Existing User".to_string(),
            "unused-hash".to_string(),
            org_id.clone(),
            None,
            None,
        ));

        let app = Application::with_store(config, store.clone(), notifier.clone())
            .await
            .expect("Failed to build test application");

        let address = format!("http://127.0.0.1:{}", app.port());

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to come up.
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            store,
            notifier,
            jwt,
            org_id,
            other_org_id,
            super_admin_role_id,
            org_admin_role_id,
            hr_role_id,
            viewer_role_id,
        }
    }

    /// Bearer token for an org_admin of the seeded organization.
    pub fn admin_token(&self) -> String {
        self.token_for(
            "admin-1",
            "admin@acme.test",
            Some(&self.org_id),
            Some(&self.org_admin_role_id),
        )
    }

    pub fn token_for(
        &self,
        sub: &str,
        email: &str,
        org: Option<&str>,
        role: Option<&str>,
    ) -> String {
        self.jwt
            .generate_access_token(sub, email, org, role)
            .expect("Failed to issue test token")
    }
}
