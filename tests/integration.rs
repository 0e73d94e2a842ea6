use base64::Engine as _;
use image::{GrayImage, Luma, Rgb, RgbImage};
use photo_studio::{
    ai::{MockGenerationClient, ReferenceImages, SeedreamClient},
    catalog::Catalog,
    config::Config,
    error::GenerationFailure,
    image::{ImageValidator, PhotoPreprocessor},
    models::ScenarioId,
    orchestrator::{GenerationJob, Orchestrator, OrchestratorServices},
    scenarios::{plan, ScenarioRequest},
    session::{Session, SessionStep},
};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_photo(dir: &Path, name: &str, color: [u8; 3]) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(64, 48, Rgb(color)).save(&path).unwrap();
    path
}

fn setup() -> (TempDir, Config) {
    let dir = TempDir::new().unwrap();
    let config = Config::for_dir(dir.path());
    config.ensure_directories().unwrap();
    (dir, config)
}

fn orchestrator_with(config: &Config, mock: &MockGenerationClient) -> Orchestrator {
    Orchestrator::with_services(
        OrchestratorServices {
            generator: Box::new(mock.clone()),
            preprocessor: PhotoPreprocessor::new(&config.temp_dir()),
        },
        config,
    )
    .with_delay(Duration::ZERO)
}

fn celebrity_job(config: &Config, photo: PathBuf, names: &[&str]) -> GenerationJob {
    let mut request = ScenarioRequest::new(ScenarioId::Celebrity).with_photos(vec![photo]);
    request.characters = names.iter().map(|n| n.to_string()).collect();
    plan(&request, &Catalog::bundled().unwrap(), config).unwrap()
}

#[tokio::test]
async fn test_mock_end_to_end_three_characters() {
    let (dir, config) = setup();
    let photo = write_photo(dir.path(), "me.png", [120, 80, 60]);
    let mock = MockGenerationClient::new(&config.images_dir()).with_delay(Duration::ZERO);
    let orchestrator = orchestrator_with(&config, &mock);
    let job = celebrity_job(&config, photo.clone(), &["Iron Man", "Spider-Man", "Harry Potter"]);

    let mut session = Session::load(&config.session_path());
    let report = orchestrator.run(&job, &mut session).await.unwrap();

    assert_eq!(report.succeeded.len(), 3);
    assert!(report.failed.is_empty());
    assert_eq!(mock.get_call_count(), 3);
    for image in &report.succeeded {
        assert!(image.starts_with(config.images_dir()));
        assert!(image.exists());
    }

    let reloaded = Session::load(&config.session_path());
    let state = reloaded.state();
    assert_eq!(state.step, SessionStep::InputsCollected);
    assert_eq!(state.generated_images.len(), 3);
    assert_eq!(state.image_order, state.generated_images);
    assert_eq!(state.user_photo, Some(photo));
    assert_eq!(state.selected_characters.len(), 3);
    assert_eq!(state.image_count, 3);

    // Preprocessed photo is temporary; the session file survives cleanup.
    assert_eq!(orchestrator.cleanup_temp_files(), 1);
    assert!(config.session_path().exists());
}

#[tokio::test]
async fn test_couple_prompt_binds_each_photo() {
    let (dir, config) = setup();
    let photos = vec![
        write_photo(dir.path(), "a.png", [10, 10, 10]),
        write_photo(dir.path(), "b.png", [200, 200, 200]),
    ];
    let request = ScenarioRequest::new(ScenarioId::Couple).with_photos(photos);
    let job = plan(&request, &Catalog::bundled().unwrap(), &config).unwrap();

    let mock = MockGenerationClient::new(&config.images_dir()).with_delay(Duration::ZERO);
    let mut session = Session::load(&config.session_path());
    orchestrator_with(&config, &mock)
        .run(&job, &mut session)
        .await
        .unwrap();

    let requests = mock.get_requests();
    assert_eq!(requests.len(), 1);
    let prompt = &requests[0].prompt;
    assert!(prompt.contains("EXACTLY 2 PEOPLE"));
    assert!(prompt.contains("Person 1: Extract facial features, gender, age"));
    assert!(prompt.contains("appearance from input photo #1 only."));
    assert!(prompt.contains("Person 2: Extract facial features, gender, age"));
    assert!(prompt.contains("appearance from input photo #2 only."));
    assert!(!prompt.contains("photo #3"));
    match &requests[0].image {
        Some(ReferenceImages::Multiple(uris)) => assert_eq!(uris.len(), 2),
        other => panic!("expected two reference images, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_credential_makes_no_http_calls() {
    let (dir, config) = setup();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = SeedreamClient::new(
        None,
        format!("{}/api/v3/images/generations", server.uri()),
        &config.images_dir(),
        ImageValidator::new(false),
    );
    let orchestrator = Orchestrator::with_services(
        OrchestratorServices {
            generator: Box::new(client),
            preprocessor: PhotoPreprocessor::new(&config.temp_dir()),
        },
        &config,
    )
    .with_delay(Duration::ZERO);

    let photo = write_photo(dir.path(), "me.png", [1, 2, 3]);
    let job = celebrity_job(&config, photo, &["Iron Man", "Wonder Woman"]);
    let mut session = Session::load(&config.session_path());
    let report = orchestrator.run(&job, &mut session).await.unwrap();

    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed.len(), 2);
    for failed in &report.failed {
        assert_eq!(failed.reason, GenerationFailure::MissingCredential);
    }
    assert!(session.state().generated_images.is_empty());
    server.verify().await;
}

#[tokio::test]
async fn test_real_client_stores_validated_image() {
    let (dir, config) = setup();
    let mut png = Vec::new();
    GrayImage::from_fn(600, 600, |x, y| {
        if (x / 6 + y / 6) % 2 == 0 {
            Luma([0])
        } else {
            Luma([255])
        }
    })
    .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
    .unwrap();
    let b64 = base64::engine::general_purpose::STANDARD.encode(&png);

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v3/images/generations"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"b64_json": b64}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = SeedreamClient::new(
        Some("test-key".to_string()),
        format!("{}/api/v3/images/generations", server.uri()),
        &config.images_dir(),
        ImageValidator::new(false),
    );
    let orchestrator = Orchestrator::with_services(
        OrchestratorServices {
            generator: Box::new(client),
            preprocessor: PhotoPreprocessor::new(&config.temp_dir()),
        },
        &config,
    )
    .with_delay(Duration::ZERO);

    let photo = write_photo(dir.path(), "me.png", [1, 2, 3]);
    let job = celebrity_job(&config, photo, &["Iron Man"]);
    let mut session = Session::load(&config.session_path());
    let report = orchestrator.run(&job, &mut session).await.unwrap();

    assert_eq!(report.succeeded.len(), 1);
    let stored = &report.succeeded[0];
    assert!(stored
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("celebrity_iron_man_000_"));
    assert_eq!(std::fs::read(stored).unwrap(), png);
    server.verify().await;
}

#[tokio::test]
async fn test_every_unit_is_attempted_once() {
    for n in 1..=6usize {
        let (dir, config) = setup();
        let photo = write_photo(dir.path(), "me.png", [9, 9, 9]);
        let mock = MockGenerationClient::new(&config.images_dir())
            .with_delay(Duration::ZERO)
            .with_failure("_001_")
            .with_failure("_004_");

        let mut request = ScenarioRequest::new(ScenarioId::Celebrity).with_photos(vec![photo]);
        request.count = Some(n);
        let job = plan(&request, &Catalog::bundled().unwrap(), &config).unwrap();
        assert_eq!(job.units.len(), n);

        let mut session = Session::load(&config.session_path());
        let report = orchestrator_with(&config, &mock)
            .run(&job, &mut session)
            .await
            .unwrap();

        assert_eq!(mock.get_call_count(), n);
        assert_eq!(report.succeeded.len() + report.failed.len(), n);
        let expected_failures = [1, 4].iter().filter(|&&i| i < n).count();
        assert_eq!(report.failed.len(), expected_failures);
        assert_eq!(session.state().generated_images, report.succeeded);
    }
}

#[tokio::test(start_paused = true)]
async fn test_mock_mode_from_config_paces_requests() {
    let (dir, mut config) = setup();
    config.mock.enabled = true;
    config.mock.use_sample_images = false;
    let photo = write_photo(dir.path(), "me.png", [50, 60, 70]);
    let job = celebrity_job(&config, photo, &["Iron Man", "Wonder Woman", "Spider-Man"]);

    let orchestrator = Orchestrator::new(&config);
    let mut session = Session::load(&config.session_path());
    let start = tokio::time::Instant::now();
    let report = orchestrator.run(&job, &mut session).await.unwrap();

    assert_eq!(report.succeeded.len(), 3);
    // Two 2 s pauses between three units, plus the simulated API latency.
    assert!(start.elapsed() >= Duration::from_secs(4));
    for image in &report.succeeded {
        let decoded = image::open(image).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (2048, 2048));
    }
}
