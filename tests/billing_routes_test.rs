#[cfg(feature = "test-billing")]
mod tests {
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use mealplan_entitlements::billing::{
        BillingProvider, FixedClock, GroupId, InMemorySubscriptionStore, InMemoryUsageStore,
        MockPortalClient, NoOpAuditLogger, StoredSubscription, SubscriptionStatus, calendar_month_start,
        period::unix_seconds,
    };
    use mealplan_entitlements::{BillingState, ConfigBuilder, billing_routes};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    const NOW: i64 = 1_773_000_000;

    struct Harness {
        app: Router,
        subscriptions: InMemorySubscriptionStore,
        usage: InMemoryUsageStore,
    }

    fn harness() -> Harness {
        let config = ConfigBuilder::new()
            .with_stripe_secret_key("sk_test_123")
            .with_override_group_ids(["grp_internal"])
            .build()
            .unwrap();

        let subscriptions = InMemorySubscriptionStore::new();
        let usage = InMemoryUsageStore::new();
        let state = BillingState::builder(
            config.billing,
            Arc::new(subscriptions.clone()),
            Arc::new(usage.clone()),
            Arc::new(MockPortalClient::new()),
        )
        .clock(Arc::new(FixedClock::at_timestamp(NOW)))
        .audit_logger(Arc::new(NoOpAuditLogger))
        .build()
        .unwrap();

        Harness {
            app: billing_routes(state),
            subscriptions,
            usage,
        }
    }

    fn month_start() -> u64 {
        unix_seconds(calendar_month_start(FixedClock::at_timestamp(NOW).0))
    }

    fn group(id: &str) -> GroupId {
        GroupId::parse(id).unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(uri: &str, role: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri).header("x-user-id", "user_1");
        if let Some(role) = role {
            builder = builder.header("x-group-role", role);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post(uri: &str, role: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-user-id", "user_1")
            .header("x-group-role", role)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn save_customer(store: &InMemorySubscriptionStore, id: &str) {
        store.save_subscription(
            &group(id),
            BillingProvider::Stripe,
            StoredSubscription {
                provider_customer_id: "cus_123".to_string(),
                provider_subscription_id: "sub_123".to_string(),
                status: SubscriptionStatus::Active,
                current_period_start: month_start(),
                current_period_end: month_start() + 2_592_000,
                cancel_at_period_end: false,
            },
        );
    }

    #[tokio::test]
    async fn test_entitlement_for_free_group() {
        let h = harness();
        h.usage.set_usage(&group("grp_1"), month_start(), 2);

        let (status, body) = send(h.app, get("/billing/groups/grp_1/entitlement?source_type=image", Some("owner"))).await;

        assert_eq!(status, StatusCode::OK);
        let entitlement = &body["entitlement"];
        assert_eq!(entitlement["planTier"], "free");
        assert_eq!(entitlement["monthlyCredits"], 5);
        assert_eq!(entitlement["remainingCredits"], 3);
        assert_eq!(entitlement["requiredCredits"], 2);
        assert_eq!(entitlement["allowed"], true);
        assert_eq!(entitlement["reasonCode"], "sufficient_credits");
        assert_eq!(body["ctas"]["showUpgrade"], true);
        assert_eq!(body["ctas"]["showManage"], false);
        assert_eq!(body["ctas"]["showBlockedNotice"], false);
    }

    #[tokio::test]
    async fn test_member_sees_no_ctas() {
        let h = harness();
        h.usage.set_usage(&group("grp_1"), month_start(), 5);

        let (status, body) = send(h.app, get("/billing/groups/grp_1/entitlement?source_type=url", Some("member"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["entitlement"]["allowed"], false);
        assert_eq!(body["ctas"], json!({ "showUpgrade": false, "showManage": false, "showBlockedNotice": false }));
    }

    #[tokio::test]
    async fn test_entitlement_requires_user() {
        let h = harness();
        let request = Request::builder()
            .uri("/billing/groups/grp_1/entitlement?source_type=url")
            .body(Body::empty())
            .unwrap();

        let (status, _) = send(h.app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_entitlement_rejects_bad_input() {
        let h = harness();
        let (status, body) = send(h.app.clone(), get("/billing/groups/grp_1/entitlement?source_type=pdf", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error_id"].is_string());

        let (status, _) = send(h.app.clone(), get("/billing/groups/grp_1/entitlement", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(h.app, get("/billing/groups/grp%201/entitlement?source_type=url", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_entitlement_fails_closed_on_outage() {
        let h = harness();
        h.usage.set_unavailable(true);

        let (status, body) = send(h.app, get("/billing/groups/grp_1/entitlement?source_type=url", None)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["reason_code"], "entitlement_unavailable");
    }

    #[tokio::test]
    async fn test_admission_admitted() {
        let h = harness();
        let (status, body) = send(
            h.app,
            post("/imports/admission", "member", json!({ "group_id": "grp_1", "source_type": "text" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["admitted"], true);
        assert_eq!(body["reason_code"], "sufficient_credits");
        assert_eq!(body["entitlement"]["groupId"], "grp_1");
    }

    #[tokio::test]
    async fn test_admission_denied_when_exhausted() {
        let h = harness();
        h.usage.set_usage(&group("grp_1"), month_start(), 5);

        let (status, body) = send(
            h.app,
            post("/imports/admission", "member", json!({ "group_id": "grp_1", "source_type": "url" })),
        )
        .await;

        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["admitted"], false);
        assert_eq!(body["reason_code"], "insufficient_credits");
    }

    #[tokio::test]
    async fn test_admission_denied_on_outage() {
        let h = harness();
        h.subscriptions.set_unavailable(true);

        let (status, body) = send(
            h.app,
            post("/imports/admission", "member", json!({ "group_id": "grp_1", "source_type": "url" })),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["admitted"], false);
        assert_eq!(body["reason_code"], "entitlement_unavailable");
        assert!(body.get("entitlement").is_none());
    }

    #[tokio::test]
    async fn test_admission_override_group() {
        let h = harness();
        h.usage.set_usage(&group("grp_internal"), month_start(), 1_000);

        let (status, body) = send(
            h.app,
            post("/imports/admission", "member", json!({ "group_id": "grp_internal", "source_type": "image" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reason_code"], "override_active");
        assert_eq!(body["entitlement"]["planTier"], "unlimited");
        assert_eq!(body["entitlement"]["remainingCredits"], "unlimited");
    }

    #[tokio::test]
    async fn test_portal_for_owner() {
        let h = harness();
        save_customer(&h.subscriptions, "grp_paid");

        let (status, body) = send(
            h.app,
            post("/billing/groups/grp_paid/portal", "owner", json!({ "return_url": "https://app.mealplan.dev/settings" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["url"].as_str().unwrap().starts_with("https://"));
    }

    #[tokio::test]
    async fn test_portal_rejections() {
        let h = harness();
        save_customer(&h.subscriptions, "grp_paid");
        let body = json!({ "return_url": "https://app.mealplan.dev/settings" });

        let (status, _) = send(h.app.clone(), post("/billing/groups/grp_paid/portal", "member", body.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(h.app.clone(), post("/billing/groups/grp_free/portal", "admin", body)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            h.app,
            post("/billing/groups/grp_paid/portal", "admin", json!({ "return_url": "http://app.mealplan.dev" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
