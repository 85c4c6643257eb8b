use std::{path::PathBuf, sync::Arc};
use vrouter::parsing::{Config, ConfigError};
use vrouter_core::{networks::Capture, protocols::ipv4::Ipv4Address, Origin, Router};

fn fixture(name: &str) -> PathBuf {
    [env!("CARGO_MANIFEST_DIR"), "tests", "config", name]
        .iter()
        .collect()
}

fn load(routes: &str) -> Result<Config, ConfigError> {
    Config::load(
        &fixture("r1.interfaces"),
        Some(&fixture(routes)),
        &fixture("r1.arp"),
    )
}

#[test]
fn builds_router_from_files() -> anyhow::Result<()> {
    let config = load("r1.routes")?;
    assert_eq!(config.interfaces.len(), 2);
    assert_eq!(config.routes.len(), 2);
    assert_eq!(config.arp.len(), 3);

    let capture = Arc::new(Capture::new(config.interface_set()));
    let router = Router::new(capture, config.arp_cache(), false);
    config.install_routes(&router);
    router.start();

    // Two connected routes plus two static ones
    assert_eq!(router.table().len(), 4);
    let entry = router
        .table()
        .lookup([172, 16, 4, 4].into())
        .expect("static route");
    assert_eq!(entry.gateway, Ipv4Address::new([192, 168, 1, 2]));
    assert_eq!(entry.interface, 0);
    assert_eq!(entry.metric, 1);
    assert_eq!(entry.origin, Origin::Static);

    // Anything else falls through to the default route
    let entry = router.table().lookup([8, 8, 8, 8].into()).expect("default");
    assert_eq!(entry.interface, 1);
    assert_eq!(entry.metric, 0);

    // More specific connected route beats the default
    let entry = router.table().lookup([10, 0, 0, 7].into()).expect("connected");
    assert_eq!(entry.origin, Origin::Connected);

    assert_eq!(
        router.arp().lookup([10, 0, 0, 254].into()),
        Some(0x0200_0000_0300)
    );
    Ok(())
}

#[test]
fn routes_file_is_optional() -> anyhow::Result<()> {
    let config = Config::load(&fixture("r1.interfaces"), None, &fixture("r1.arp"))?;
    assert!(config.routes.is_empty());
    Ok(())
}

#[test]
fn reports_bad_mask_with_location() {
    let err = load("bad_mask.routes").unwrap_err();
    match &err {
        ConfigError::Syntax { file, line, .. } => {
            assert!(file.ends_with("bad_mask.routes"));
            assert_eq!(*line, 1);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(err.to_string().contains("expected subnet mask"));
}

#[test]
fn reports_unknown_interface() {
    let err = load("unknown_interface.routes").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { line: 2, .. }));
    assert!(err.to_string().contains("wlan0"));
}

#[test]
fn reports_missing_file() {
    let err = Config::load(
        &fixture("missing.interfaces"),
        None,
        &fixture("r1.arp"),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}
