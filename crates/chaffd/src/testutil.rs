use chaff_core::config::ChaffConfig;
use std::path::Path;

/// Self-signed `localhost` certificate, used as both node identity and CA.
pub fn write_tls(config: &mut ChaffConfig, dir: &Path) {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert = dir.join("node.pem");
    let key = dir.join("node.key");
    std::fs::write(&cert, certified.cert.pem()).unwrap();
    std::fs::write(&key, certified.key_pair.serialize_pem()).unwrap();
    config.tls.cert = Some(cert.clone());
    config.tls.key = Some(key);
    config.tls.ca_cert = Some(cert);
}
