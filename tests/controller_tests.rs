use sensonet::types::DeviceFilter;
use sensonet::{
    Controller, Error, HeatingParams, HotwaterParams, Param, QuickMode, SensonetClient,
    StaticToken, Strategy, StrategyOutcome,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SYSTEM_PATH: &str = "/systems/sys-0001/tli";
const BOOST_PATH: &str = "/systems/sys-0001/tli/domestic-hot-water/255/boost";
const VETO_PATH: &str = "/systems/sys-0001/tli/zones/0/quick-veto";

fn controller_for(server: &MockServer) -> Controller {
    Controller::new(SensonetClient::new_with_base_url(
        Arc::new(StaticToken::new("test-token")),
        server.uri(),
    ))
}

async fn mount_homes(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/homes"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(include_str!("fixtures/homes.json")),
        )
        .mount(server)
        .await;
}

async fn mount_system(server: &MockServer, body: &'static str) {
    Mock::given(method("GET"))
        .and(path(SYSTEM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_reads_are_cached() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/homes"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(include_str!("fixtures/homes.json")),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(SYSTEM_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(include_str!("fixtures/system.json")),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let controller = controller_for(&mock_server);
    for _ in 0..3 {
        assert_eq!(controller.get_homes().await.unwrap().len(), 1);
        let status = controller.get_system("sys-0001").await.unwrap();
        assert_eq!(status.state.dhw[0].current_dhw_temperature, 40.0);
    }
}

#[tokio::test]
async fn test_unknown_system_is_not_found() {
    let mock_server = MockServer::start().await;
    mount_homes(&mock_server).await;
    mount_system(&mock_server, include_str!("fixtures/system.json")).await;

    let controller = controller_for(&mock_server);
    let err = controller.get_system("sys-9999").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_no_homes_is_empty_result() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/homes"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(&mock_server)
        .await;

    let err = controller_for(&mock_server).get_homes().await.unwrap_err();
    assert!(matches!(err, Error::EmptyResult(_)));
}

#[tokio::test]
async fn test_no_systems_is_empty_result() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/homes"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(&mock_server)
        .await;

    let controller = controller_for(&mock_server);

    let err = controller.get_system("sys-0001").await.unwrap_err();
    assert!(matches!(err, Error::EmptyResult(_)));
    assert!(!err.is_not_found());

    let err = controller
        .get_device_data("sys-0001", DeviceFilter::All)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EmptyResult(_)));

    let err = controller.get_mpc_data("sys-0001").await.unwrap_err();
    assert!(matches!(err, Error::EmptyResult(_)));
}

#[tokio::test]
async fn test_fetch_errors_are_cached() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/homes"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let controller = controller_for(&mock_server);
    for _ in 0..3 {
        let err = controller.get_homes().await.unwrap_err();
        assert_eq!(err.status(), Some(503));
    }
}

#[tokio::test]
async fn test_polling_adopts_remote_boost() {
    let mock_server = MockServer::start().await;
    mount_homes(&mock_server).await;
    mount_system(&mock_server, include_str!("fixtures/system_boost.json")).await;

    let controller = controller_for(&mock_server);
    assert_eq!(controller.current_quick_mode("sys-0001").await, QuickMode::None);
    controller.get_system("sys-0001").await.unwrap();
    assert_eq!(controller.current_quick_mode("sys-0001").await, QuickMode::Hotwater);
}

#[tokio::test]
async fn test_quick_mode_is_tracked_per_system() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/homes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"homeName": "House", "systemId": "sys-A"},
            {"homeName": "Cottage", "systemId": "sys-B"}
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/systems/sys-A/tli"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(include_str!("fixtures/system_boost.json")),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/systems/sys-B/tli"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(include_str!("fixtures/system.json")),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/systems/sys-B/tli/domestic-hot-water/255/boost"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/systems/sys-A/tli/domestic-hot-water/255/boost"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let controller = controller_for(&mock_server);
    controller.get_system("sys-B").await.unwrap();
    assert_eq!(controller.current_quick_mode("sys-A").await, QuickMode::Hotwater);
    assert_eq!(controller.current_quick_mode("sys-B").await, QuickMode::None);

    // The boost running on sys-A does not block sys-B.
    let outcome = controller
        .start_strategy_based(
            "sys-B",
            Strategy::HotwaterOnly,
            &HeatingParams::default(),
            &HotwaterParams::default(),
        )
        .await
        .unwrap();
    assert_eq!(outcome, StrategyOutcome::Active(QuickMode::Hotwater));
    assert_eq!(controller.current_quick_mode("sys-B").await, QuickMode::Hotwater);
    assert_eq!(controller.current_quick_mode("sys-A").await, QuickMode::Hotwater);
}

#[tokio::test]
async fn test_strategy_start_when_already_on_sends_nothing() {
    let mock_server = MockServer::start().await;
    mount_homes(&mock_server).await;
    mount_system(&mock_server, include_str!("fixtures/system_boost.json")).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let controller = controller_for(&mock_server);
    let outcome = controller
        .start_strategy_based(
            "sys-0001",
            Strategy::HotwaterThenHeating,
            &HeatingParams::default(),
            &HotwaterParams::default(),
        )
        .await
        .unwrap();

    assert_eq!(outcome, StrategyOutcome::AlreadyActive(QuickMode::Hotwater));
    assert_eq!(controller.current_quick_mode("sys-0001").await, QuickMode::Hotwater);
}

#[tokio::test]
async fn test_strategy_start_then_stop_boost() {
    let mock_server = MockServer::start().await;
    mount_homes(&mock_server).await;
    mount_system(&mock_server, include_str!("fixtures/system.json")).await;

    Mock::given(method("POST"))
        .and(path(BOOST_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path(BOOST_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let controller = controller_for(&mock_server);
    let heating = HeatingParams::default();
    let hotwater = HotwaterParams::default();

    // 40 degrees against a tapping setpoint of 45.
    let outcome = controller
        .start_strategy_based("sys-0001", Strategy::HotwaterOnly, &heating, &hotwater)
        .await
        .unwrap();
    assert_eq!(outcome, StrategyOutcome::Active(QuickMode::Hotwater));
    assert_eq!(controller.current_quick_mode("sys-0001").await, QuickMode::Hotwater);

    // The remote snapshot does not show the boost yet; the tracked mode
    // is kept and stopped anyway.
    let stopped = controller
        .stop_strategy_based("sys-0001", &heating, &hotwater)
        .await
        .unwrap();
    assert_eq!(stopped, QuickMode::Hotwater);
    assert_eq!(controller.current_quick_mode("sys-0001").await, QuickMode::None);
}

#[tokio::test]
async fn test_strategy_falls_through_to_quick_veto() {
    let mock_server = MockServer::start().await;
    mount_homes(&mock_server).await;
    mount_system(&mock_server, include_str!("fixtures/system.json")).await;

    Mock::given(method("POST"))
        .and(path(BOOST_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(VETO_PATH))
        .and(body_json(json!({
            "desiredRoomTemperatureSetpoint": 21.0,
            "duration": 0.5
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let controller = controller_for(&mock_server);
    let heating = HeatingParams {
        veto_setpoint: Param::Specified(21.0),
        ..Default::default()
    };

    // 40 is not below 45 - 5, so hot water is not eligible.
    let outcome = controller
        .start_strategy_based(
            "sys-0001",
            Strategy::HotwaterThenHeating,
            &heating,
            &HotwaterParams::default(),
        )
        .await
        .unwrap();
    assert_eq!(outcome, StrategyOutcome::Active(QuickMode::Heating));
}

#[tokio::test]
async fn test_nothing_eligible_goes_idle() {
    let mock_server = MockServer::start().await;
    mount_homes(&mock_server).await;
    mount_system(&mock_server, include_str!("fixtures/system.json")).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let controller = controller_for(&mock_server);
    // Circuit 7 does not exist.
    let hotwater = HotwaterParams {
        index: Param::Specified(7),
    };
    let heating = HeatingParams::default();

    let outcome = controller
        .start_strategy_based("sys-0001", Strategy::HotwaterOnly, &heating, &hotwater)
        .await
        .unwrap();
    assert_eq!(outcome, StrategyOutcome::Active(QuickMode::Idle));

    // Idle counts as active for a second start.
    let again = controller
        .start_strategy_based("sys-0001", Strategy::HeatingOnly, &heating, &hotwater)
        .await
        .unwrap();
    assert_eq!(again, StrategyOutcome::AlreadyActive(QuickMode::Idle));

    let stopped = controller
        .stop_strategy_based("sys-0001", &heating, &hotwater)
        .await
        .unwrap();
    assert_eq!(stopped, QuickMode::Idle);
    assert_eq!(controller.current_quick_mode("sys-0001").await, QuickMode::None);
}

#[tokio::test]
async fn test_failed_boost_leaves_mode_unchanged() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(VETO_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(BOOST_PATH))
        .respond_with(
            ResponseTemplate::new(500).set_body_string(include_str!("fixtures/error.json")),
        )
        .mount(&mock_server)
        .await;

    let controller = controller_for(&mock_server);

    controller
        .start_zone_quick_veto(
            "sys-0001",
            Param::UseDefault,
            Param::UseDefault,
            Param::UseDefault,
        )
        .await
        .unwrap();
    assert_eq!(controller.current_quick_mode("sys-0001").await, QuickMode::Heating);

    let err = controller
        .start_hot_water_boost("sys-0001", Param::UseDefault)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(controller.current_quick_mode("sys-0001").await, QuickMode::Heating);
}

#[tokio::test]
async fn test_failed_strategy_start_tracks_nothing() {
    let mock_server = MockServer::start().await;
    mount_homes(&mock_server).await;
    mount_system(&mock_server, include_str!("fixtures/system.json")).await;

    Mock::given(method("POST"))
        .and(path(BOOST_PATH))
        .respond_with(
            ResponseTemplate::new(500).set_body_string(include_str!("fixtures/error.json")),
        )
        .mount(&mock_server)
        .await;

    let controller = controller_for(&mock_server);

    let err = controller
        .start_strategy_based(
            "sys-0001",
            Strategy::HotwaterOnly,
            &HeatingParams::default(),
            &HotwaterParams::default(),
        )
        .await
        .unwrap_err();
    assert!(err.is_remote());
    assert_eq!(controller.current_quick_mode("sys-0001").await, QuickMode::None);
}

#[tokio::test]
async fn test_stale_boost_ignored_right_after_stop() {
    let mock_server = MockServer::start().await;
    mount_homes(&mock_server).await;
    // The snapshot still reports the boost after it was stopped.
    mount_system(&mock_server, include_str!("fixtures/system_boost.json")).await;

    Mock::given(method("POST"))
        .and(path(BOOST_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path(BOOST_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let controller = controller_for(&mock_server);

    controller
        .start_hot_water_boost("sys-0001", Param::UseDefault)
        .await
        .unwrap();
    controller
        .stop_hot_water_boost("sys-0001", Param::UseDefault)
        .await
        .unwrap();
    assert_eq!(controller.current_quick_mode("sys-0001").await, QuickMode::None);

    // Within the debounce window the stale CYLINDER_BOOST is not adopted,
    // so the start selects and sends a fresh boost.
    let outcome = controller
        .start_strategy_based(
            "sys-0001",
            Strategy::HotwaterOnly,
            &HeatingParams::default(),
            &HotwaterParams::default(),
        )
        .await
        .unwrap();
    assert_eq!(outcome, StrategyOutcome::Active(QuickMode::Hotwater));
    assert_eq!(controller.current_quick_mode("sys-0001").await, QuickMode::Hotwater);
}

#[tokio::test]
async fn test_failed_stop_keeps_tracked_mode() {
    let mock_server = MockServer::start().await;
    mount_homes(&mock_server).await;
    mount_system(&mock_server, include_str!("fixtures/system_boost.json")).await;

    Mock::given(method("DELETE"))
        .and(path(BOOST_PATH))
        .respond_with(ResponseTemplate::new(502))
        .mount(&mock_server)
        .await;

    let controller = controller_for(&mock_server);
    let err = controller
        .stop_strategy_based(
            "sys-0001",
            &HeatingParams::default(),
            &HotwaterParams::default(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(502));
    assert_eq!(controller.current_quick_mode("sys-0001").await, QuickMode::Hotwater);
}

#[tokio::test]
async fn test_direct_commands_track_mode() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let controller = controller_for(&mock_server);

    controller
        .start_hot_water_boost("sys-0001", Param::UseDefault)
        .await
        .unwrap();
    assert_eq!(controller.current_quick_mode("sys-0001").await, QuickMode::Hotwater);

    // A veto does not displace a tracked boost.
    controller
        .start_zone_quick_veto(
            "sys-0001",
            Param::UseDefault,
            Param::UseDefault,
            Param::UseDefault,
        )
        .await
        .unwrap();
    assert_eq!(controller.current_quick_mode("sys-0001").await, QuickMode::Hotwater);

    // Neither does stopping the veto.
    controller
        .stop_zone_quick_veto("sys-0001", Param::UseDefault)
        .await
        .unwrap();
    assert_eq!(controller.current_quick_mode("sys-0001").await, QuickMode::Hotwater);

    controller
        .stop_hot_water_boost("sys-0001", Param::UseDefault)
        .await
        .unwrap();
    assert_eq!(controller.current_quick_mode("sys-0001").await, QuickMode::None);

    controller
        .start_zone_quick_veto(
            "sys-0001",
            Param::UseDefault,
            Param::UseDefault,
            Param::UseDefault,
        )
        .await
        .unwrap();
    assert_eq!(controller.current_quick_mode("sys-0001").await, QuickMode::Heating);
}

#[tokio::test]
async fn test_device_and_power_data() {
    let mock_server = MockServer::start().await;
    mount_homes(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/emf/v2/sys-0001/currentSystem"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(include_str!("fixtures/devices.json")),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/hem/sys-0001/mpc"))
        .respond_with(ResponseTemplate::new(200).set_body_string(include_str!("fixtures/mpc.json")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let controller = controller_for(&mock_server);

    let all = controller
        .get_device_data("sys-0001", DeviceFilter::All)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].role.as_str(), "primary_heat_generator");

    let backup = controller
        .get_device_data("sys-0001", DeviceFilter::Backup)
        .await
        .unwrap();
    assert_eq!(backup.len(), 1);
    assert_eq!(backup[0].device.product_name, "uniTOWER backup heater");

    let mpc = controller.get_mpc_data("sys-0001").await.unwrap();
    assert_eq!(mpc.total_power(), 1240.0);
    controller.get_mpc_data("sys-0001").await.unwrap();

    let err = controller.get_mpc_data("sys-9999").await.unwrap_err();
    assert!(err.is_not_found());
}
