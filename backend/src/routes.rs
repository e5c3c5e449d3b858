use actix_web::{HttpResponse, web};
use shared::UploadRequest;

use crate::error::ApiError;
use crate::inference::{self, upload::Upload};
use crate::model::ModelContext;

/// Registers the three inference endpoints. `max_body_bytes` bounds the JSON
/// body, which carries the whole base64 image.
pub fn configure_routes(max_body_bytes: usize) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.app_data(
            web::JsonConfig::default()
                .limit(max_body_bytes)
                .error_handler(|err, _req| ApiError::InvalidBody(err.to_string()).into()),
        )
        .service(web::resource("/get_disease").route(web::post().to(get_disease)))
        .service(web::resource("/test_skin").route(web::post().to(test_skin)))
        .service(web::resource("/fish_category").route(web::post().to(fish_category)));
    }
}

async fn get_disease(
    ctx: web::Data<ModelContext>,
    body: web::Json<UploadRequest>,
) -> Result<HttpResponse, ApiError> {
    let upload = Upload::try_from(body.into_inner())?;
    log::info!("/get_disease called for {}", upload.filename);
    let response = web::block(move || inference::detect_disease(&ctx, &upload)).await??;
    Ok(HttpResponse::Ok().json(response))
}

async fn test_skin(
    ctx: web::Data<ModelContext>,
    body: web::Json<UploadRequest>,
) -> Result<HttpResponse, ApiError> {
    let upload = Upload::try_from(body.into_inner())?;
    log::info!("/test_skin called for {}", upload.filename);
    let response = web::block(move || inference::segment_skin(&ctx, &upload)).await??;
    Ok(HttpResponse::Ok().json(response))
}

async fn fish_category(
    ctx: web::Data<ModelContext>,
    body: web::Json<UploadRequest>,
) -> Result<HttpResponse, ApiError> {
    let upload = Upload::try_from(body.into_inner())?;
    log::info!("/fish_category called for {}", upload.filename);
    let response = web::block(move || inference::classify_category(&ctx, &upload)).await??;
    Ok(HttpResponse::Ok().json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{HEALTHY_LABEL, NOT_A_MEMBER_LABEL};
    use crate::model::Probs;
    use crate::testing::{FakeModel, context, upload_for};
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use image::{Rgb, RgbImage};
    use serde_json::{Value, json};
    use shared::ErrorResponse;

    const ENDPOINTS: [&str; 3] = ["/get_disease", "/test_skin", "/fish_category"];
    const BODY_LIMIT: usize = 64 * 1024 * 1024;

    fn body_for(filename: &str) -> Value {
        let upload = upload_for(&RgbImage::from_pixel(8, 8, Rgb([1, 2, 3])), filename);
        json!({ "image": upload.image, "filename": upload.filename })
    }

    #[actix_web::test]
    async fn missing_fields_are_bad_requests_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), FakeModel::default(), FakeModel::default(), FakeModel::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ctx))
                .configure(configure_routes(BODY_LIMIT)),
        )
        .await;

        for path in ENDPOINTS {
            for body in [json!({ "image": "aGk=" }), json!({ "filename": "a.png" }), json!({})] {
                let req = test::TestRequest::post().uri(path).set_json(body).to_request();
                let resp = test::call_service(&app, req).await;
                assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{path}");
                let err: ErrorResponse = test::read_body_json(resp).await;
                assert_eq!(err.error, "Missing image or filename");
            }
        }
    }

    #[actix_web::test]
    async fn malformed_json_is_a_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), FakeModel::default(), FakeModel::default(), FakeModel::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ctx))
                .configure(configure_routes(BODY_LIMIT)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/get_disease")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let err: ErrorResponse = test::read_body_json(resp).await;
        assert!(err.error.starts_with("Invalid request body"));
    }

    #[actix_web::test]
    async fn model_failures_surface_as_server_errors() {
        let dir = tempfile::tempdir().unwrap();
        let broken = || FakeModel {
            failure: Some("weights are corrupt".into()),
            ..Default::default()
        };
        let ctx = context(dir.path(), broken(), broken(), broken());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ctx))
                .configure(configure_routes(BODY_LIMIT)),
        )
        .await;

        for path in ENDPOINTS {
            let req = test::TestRequest::post().uri(path).set_json(body_for("x.png")).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
            let err: ErrorResponse = test::read_body_json(resp).await;
            assert_eq!(err.error, "Model runtime error: weights are corrupt");
        }
        // the upload stays behind
        assert!(dir.path().join("x.png").exists());
    }

    #[actix_web::test]
    async fn undecodable_image_is_a_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), FakeModel::default(), FakeModel::default(), FakeModel::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ctx))
                .configure(configure_routes(BODY_LIMIT)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/get_disease")
            .set_json(json!({ "image": "@@@", "filename": "a.png" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn endpoints_return_their_response_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = FakeModel {
            names: vec!["tilapia".into()],
            probs: Some(Probs::new(vec![0.4])),
            ..Default::default()
        };
        let ctx = context(dir.path(), FakeModel::default(), FakeModel::default(), classifier);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ctx))
                .configure(configure_routes(BODY_LIMIT)),
        )
        .await;

        let req = test::TestRequest::post().uri("/get_disease").set_json(body_for("a.png")).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert!(body["image"].is_string());
        assert_eq!(body["class_names"], json!([]));

        let req = test::TestRequest::post().uri("/test_skin").set_json(body_for("b.png")).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert!(body["image"].is_string());
        assert_eq!(body["class_names"], HEALTHY_LABEL);

        let req = test::TestRequest::post().uri("/fish_category").set_json(body_for("c.png")).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert!(body.get("image").is_none());
        assert!(body.get("class_names").is_none());
        assert_eq!(body["class_name"], NOT_A_MEMBER_LABEL);
    }

    /// Deterministic noise so the PNG does not compress below the default 2 MiB JSON limit.
    fn noisy_image(width: u32, height: u32) -> RgbImage {
        let mut state: u32 = 0x2545_f491;
        RgbImage::from_fn(width, height, |_, _| {
            let mut next = || {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state >> 24) as u8
            };
            Rgb([next(), next(), next()])
        })
    }

    #[actix_web::test]
    async fn photo_sized_uploads_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), FakeModel::default(), FakeModel::default(), FakeModel::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ctx))
                .configure(configure_routes(BODY_LIMIT)),
        )
        .await;

        let upload = upload_for(&noisy_image(900, 900), "tank.png");
        assert!(upload.image.len() > 2 * 1024 * 1024);
        let req = test::TestRequest::post()
            .uri("/get_disease")
            .set_json(json!({ "image": upload.image, "filename": upload.filename }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(dir.path().join("tank.png").exists());
    }

    #[actix_web::test]
    async fn bodies_over_the_configured_limit_are_bad_requests() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), FakeModel::default(), FakeModel::default(), FakeModel::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ctx))
                .configure(configure_routes(1024)),
        )
        .await;

        let upload = upload_for(&noisy_image(64, 64), "big.png");
        let req = test::TestRequest::post()
            .uri("/get_disease")
            .set_json(json!({ "image": upload.image, "filename": upload.filename }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let err: ErrorResponse = test::read_body_json(resp).await;
        assert!(err.error.starts_with("Invalid request body"));
    }

    #[actix_web::test]
    async fn line_wrapped_base64_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), FakeModel::default(), FakeModel::default(), FakeModel::default());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ctx))
                .configure(configure_routes(BODY_LIMIT)),
        )
        .await;

        let upload = upload_for(&noisy_image(32, 32), "wrapped.png");
        let wrapped = upload
            .image
            .as_bytes()
            .chunks(76)
            .map(|line| std::str::from_utf8(line).unwrap())
            .collect::<Vec<_>>()
            .join("\r\n");
        let req = test::TestRequest::post()
            .uri("/get_disease")
            .set_json(json!({ "image": wrapped, "filename": upload.filename }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
