use super::common::*;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use crate::audit::AUDIT_LOGS_TABLE;

#[tokio::test]
async fn create_inserts_one_row_and_one_audit_entry() {
    let fixture = fixture().await;

    let response = fixture
        .router()
        .oneshot(json_request(
            "POST",
            "/api/cms/blog_posts",
            Some(ADMIN_TOKEN),
            json!({ "title": "Studying in Germany", "published": false }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["success"], true);
    assert_eq!(payload["data"]["title"], "Studying in Germany");

    assert_eq!(fixture.rows("blog_posts").len(), 1);
    let audit = fixture.rows(AUDIT_LOGS_TABLE);
    assert_eq!(actions(&audit), vec!["CREATE_BLOG_POSTS"]);
    assert_eq!(audit[0]["entity_type"], "blog_posts");
    assert_eq!(audit[0]["entity_id"], payload["data"]["id"]);
    assert_eq!(audit[0]["actor_id"], ADMIN_ID);
}

#[tokio::test]
async fn update_captures_before_and_after() {
    let fixture = fixture().await;
    let router = fixture.router();

    let created = read_json_body(
        router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/cms/pages",
                Some(ADMIN_TOKEN),
                json!({ "slug": "visas", "title": "Visas" }),
            ))
            .await
            .expect("route executes"),
    )
    .await;
    let id = created["data"]["id"].as_str().expect("id assigned").to_string();

    let response = router
        .oneshot(json_request(
            "PATCH",
            &format!("/api/cms/pages/{id}"),
            Some(ADMIN_TOKEN),
            json!({ "title": "Student visas" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["data"]["title"], "Student visas");
    assert_eq!(payload["data"]["slug"], "visas");

    let audit = fixture.rows(AUDIT_LOGS_TABLE);
    assert_eq!(actions(&audit), vec!["CREATE_PAGES", "UPDATE_PAGES"]);
    assert_eq!(audit[1]["before"]["title"], "Visas");
    assert_eq!(audit[1]["after"]["title"], "Student visas");
}

#[tokio::test]
async fn update_succeeds_when_audit_write_fails() {
    let fixture = fixture().await.with_failing_audit();
    let router = fixture.router();

    let created = read_json_body(
        router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/cms/pages",
                Some(ADMIN_TOKEN),
                json!({ "title": "Scholarships" }),
            ))
            .await
            .expect("route executes"),
    )
    .await;
    assert_eq!(created["success"], true);
    let id = created["data"]["id"].as_str().expect("id assigned").to_string();

    let response = router
        .oneshot(json_request(
            "PATCH",
            &format!("/api/cms/pages/{id}"),
            Some(ADMIN_TOKEN),
            json!({ "title": "Scholarships 2026" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["success"], true);
    assert_eq!(fixture.rows("pages")[0]["title"], "Scholarships 2026");
    assert!(fixture.rows(AUDIT_LOGS_TABLE).is_empty());
}

#[tokio::test]
async fn list_applies_equality_filters() {
    let fixture = fixture().await;
    let router = fixture.router();
    for (title, category) in [("IELTS tips", "tests"), ("Packing list", "travel")] {
        router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/cms/blog_posts",
                Some(ADMIN_TOKEN),
                json!({ "title": title, "category": category }),
            ))
            .await
            .expect("route executes");
    }

    let response = router
        .oneshot(empty_request(
            "GET",
            "/api/cms/blog_posts?category=travel",
            Some(STUDENT_TOKEN),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    let rows = payload["data"].as_array().expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["title"], "Packing list");
}

#[tokio::test]
async fn non_object_bodies_and_missing_rows_are_rejected() {
    let fixture = fixture().await;
    let router = fixture.router();

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/cms/pages",
            Some(ADMIN_TOKEN),
            json!(["not", "an", "object"]),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = router
        .clone()
        .oneshot(json_request(
            "PATCH",
            "/api/cms/pages/missing",
            Some(ADMIN_TOKEN),
            json!({ "title": "x" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router
        .oneshot(empty_request("DELETE", "/api/cms/pages/missing", Some(ADMIN_TOKEN)))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(fixture.rows(AUDIT_LOGS_TABLE).is_empty());
}

#[tokio::test]
async fn delete_removes_row_and_audits_snapshot() {
    let fixture = fixture().await;
    let router = fixture.router();
    let created = read_json_body(
        router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/cms/faqs",
                Some(ADMIN_TOKEN),
                json!({ "question": "Do I need a visa?" }),
            ))
            .await
            .expect("route executes"),
    )
    .await;
    let id = created["data"]["id"].as_str().expect("id assigned").to_string();

    let response = router
        .oneshot(empty_request(
            "DELETE",
            &format!("/api/cms/faqs/{id}"),
            Some(ADMIN_TOKEN),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(fixture.rows("faqs").is_empty());
    let audit = fixture.rows(AUDIT_LOGS_TABLE);
    assert_eq!(actions(&audit), vec!["CREATE_FAQS", "DELETE_FAQS"]);
    assert_eq!(audit[1]["before"]["question"], "Do I need a visa?");
}

#[tokio::test]
async fn cms_requires_a_session() {
    let fixture = fixture().await;

    let response = fixture
        .router()
        .oneshot(json_request("POST", "/api/cms/pages", None, json!({ "title": "x" })))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(fixture.rows("pages").is_empty());
}

#[tokio::test]
async fn malformed_json_is_a_json_bad_request() {
    let fixture = fixture().await;

    let response = fixture
        .router()
        .oneshot(
            Request::post("/api/cms/pages")
                .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    let payload = read_json_body(response).await;
    assert!(payload["error"].is_string());
    assert!(fixture.rows("pages").is_empty());
}

#[tokio::test]
async fn list_filters_match_boolean_and_numeric_columns() {
    let fixture = fixture().await;
    let router = fixture.router();
    for (title, published, position) in [("Draft", false, 1), ("Live", true, 2)] {
        router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/cms/faqs",
                Some(ADMIN_TOKEN),
                json!({ "title": title, "published": published, "position": position }),
            ))
            .await
            .expect("route executes");
    }

    for (query, expected) in [("published=false", "Draft"), ("position=2", "Live")] {
        let payload = read_json_body(
            router
                .clone()
                .oneshot(empty_request(
                    "GET",
                    &format!("/api/cms/faqs?{query}"),
                    Some(STUDENT_TOKEN),
                ))
                .await
                .expect("route executes"),
        )
        .await;
        let rows = payload["data"].as_array().expect("rows");
        assert_eq!(rows.len(), 1, "{query}");
        assert_eq!(rows[0]["title"], expected);
    }
}
