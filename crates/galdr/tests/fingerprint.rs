use galdr::fingerprint::fingerprint;
use galdr::{Reflect, Result, Serializer};

#[derive(Reflect, Default, Debug, PartialEq)]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
}

#[derive(Reflect, Default, Debug, PartialEq)]
pub struct Route {
    pub waypoints: Vec<Waypoint>,
    pub name: String,
}

// Field-compatible with Waypoint but differently named.
#[derive(Reflect, Default, Debug, PartialEq)]
pub struct Landmark {
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
}

#[derive(Reflect, Default, Debug, PartialEq)]
pub struct Tree {
    pub label: String,
    pub children: Vec<Tree>,
}

#[test]
fn test_fingerprint_is_deterministic() {
    assert_eq!(fingerprint::<Route>(), fingerprint::<Route>());
    assert_eq!(
        fingerprint::<Route>().to_string(),
        fingerprint::<Route>().to_string()
    );
}

#[test]
fn test_type_rename_changes_the_fingerprint() {
    // Identical field layout is not enough; the name participates.
    assert_ne!(fingerprint::<Waypoint>(), fingerprint::<Landmark>());
}

#[test]
fn test_nested_records_participate() {
    assert_ne!(fingerprint::<Route>(), fingerprint::<Waypoint>());
    assert_ne!(fingerprint::<Route>(), fingerprint::<Vec<Waypoint>>());
}

#[test]
fn test_cyclic_type_terminates() {
    // The recursive expansion must cut the cycle, not hang.
    let digest = fingerprint::<Tree>();
    assert_eq!(digest, fingerprint::<Tree>());
    assert_eq!(digest.to_string().len(), 40);
}

#[test]
fn test_serializer_exposes_the_same_digest() -> Result<()> {
    let serializer = Serializer::new();

    assert_eq!(serializer.fingerprint::<Route>(), fingerprint::<Route>());

    // Fingerprinting is independent of codec derivation state.
    let mut encoded: Vec<u8> = Vec::new();
    serializer.encode(&Route::default(), &mut encoded)?;
    assert_eq!(serializer.fingerprint::<Route>(), fingerprint::<Route>());

    Ok(())
}
