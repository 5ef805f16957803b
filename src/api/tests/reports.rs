use super::*;
use crate::types::ReportId;

#[tokio::test]
async fn test_generate_report_is_accepted() {
    let (service, router, _temp_dir) = create_test_app(|_| {}).await;

    let response = send(&router, Method::POST, "/generate-report").await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let location = response.headers().get(header::LOCATION).unwrap().clone();
    let body = json_body(response).await;
    let id: ReportId = body["reportId"].as_str().unwrap().parse().unwrap();
    assert_eq!(body["statusUrl"], format!("/report-status/{}", id));
    assert_eq!(location.to_str().unwrap(), format!("/report-status/{}", id));

    let status = service.get_report_status(id).await.unwrap();
    assert_eq!(status.status, crate::types::ReportState::Queued);
}

#[tokio::test]
async fn test_second_generate_is_conflict_naming_active_report() {
    let (_service, router, _temp_dir) = create_test_app(|_| {}).await;

    let first = json_body(send(&router, Method::POST, "/generate-report").await).await;
    let response = send(&router, Method::POST, "/generate-report").await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "report_already_active");
    assert_eq!(body["error"]["details"]["active_report_id"], first["reportId"]);
}

#[tokio::test]
async fn test_generate_after_shutdown_is_unavailable() {
    let (service, router, _temp_dir) = create_test_app(|_| {}).await;
    service.shutdown().await.unwrap();

    let response = send(&router, Method::POST, "/generate-report").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_status_of_completed_report_uses_wire_field_names() {
    let (service, router, _temp_dir) = create_test_app(|_| {}).await;
    let id = service.generate_report().await.unwrap().report_id;
    drain(&service).await;

    let response = send(&router, Method::GET, &format!("/report-status/{}", id)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["id"], id.to_string());
    assert_eq!(body["status"], "completed");
    assert_eq!(body["progress"], 100);
    assert_eq!(body["processedNfts"], 23);
    assert_eq!(body["totalNfts"], 23);
    assert_eq!(body["records"].as_array().unwrap().len(), 23);
    assert_eq!(body["records"][0]["fieldID"], "F-nft-0-0");
    assert!(body["csvPath"].as_str().unwrap().ends_with(".csv"));
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn test_status_rejects_bad_and_unknown_ids() {
    let (_service, router, _temp_dir) = create_test_app(|_| {}).await;

    let response = send(&router, Method::GET, "/report-status/not-a-uuid").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], "validation_error");

    let response = send(
        &router,
        Method::GET,
        &format!("/report-status/{}", ReportId::new()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"]["code"], "report_not_found");
}

#[tokio::test]
async fn test_download_redirects_once_completed() {
    let (service, router, _temp_dir) = create_test_app(|_| {}).await;
    let id = service.generate_report().await.unwrap().report_id;
    let uri = format!("/report-download/{}/csv", id);

    let response = send(&router, Method::GET, &uri).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "report_not_ready");
    assert_eq!(body["error"]["details"]["status"], "queued");

    drain(&service).await;

    let response = send(&router, Method::GET, &uri).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body = json_body(response).await;
    assert_eq!(body["url"], location);
    assert!(location.ends_with(&format!("/reports/{}.csv", id)));
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let (service, router, _temp_dir) = create_test_app(|_| {}).await;
    let id = service.generate_report().await.unwrap().report_id;
    drain(&service).await;
    let uri = format!("/report/{}", id);

    for _ in 0..2 {
        let response = send(&router, Method::DELETE, &uri).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({"deleted": true}));
    }

    let response = send(&router, Method::GET, &format!("/report-status/{}", id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&router, Method::DELETE, "/report/nope").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_reports_with_status_filter() {
    let (service, router, _temp_dir) = create_test_app(|_| {}).await;
    let done = service.generate_report().await.unwrap().report_id;
    drain(&service).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let queued = service.generate_report().await.unwrap().report_id;

    let all = json_body(send(&router, Method::GET, "/reports").await).await;
    let ids: Vec<&str> = all
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![queued.to_string(), done.to_string()]);
    assert!(all[0].get("records").is_none());

    let active = json_body(send(&router, Method::GET, "/reports?status=active").await).await;
    assert_eq!(active.as_array().unwrap().len(), 1);
    assert_eq!(active[0]["id"], queued.to_string());

    let completed =
        json_body(send(&router, Method::GET, "/reports?status=completed").await).await;
    assert_eq!(completed[0]["id"], done.to_string());

    let response = send(&router, Method::GET, "/reports?status=done").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dead_letters_listing() {
    let (service, router, _temp_dir) = create_test_app(|_| {}).await;
    service
        .db
        .insert_message("k", "k-bad", "not json", 60_000)
        .await
        .unwrap();
    drain(&service).await;

    let body = json_body(send(&router, Method::GET, "/dead-letters").await).await;
    let dead = body.as_array().unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0]["dedupKey"], "k-bad");
    assert_eq!(dead[0]["receiveCount"], 1);
}
