//! End-to-end engine tests against an on-disk repository fixture.

use devc_engine::{
    CacheProvider, DetectError, Engine, EngineState, EngineTarget, MANDATORY_CAPABILITIES,
};
use std::io::Write;
use tempfile::NamedTempFile;

const FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<device_repository version="2024-06">
  <devices>
    <device id="generic" user_agent="">
      <group id="product_info">
        <capability name="brand_name" value=""/>
        <capability name="model_name" value=""/>
        <capability name="marketing_name" value=""/>
        <capability name="device_os" value=""/>
        <capability name="device_os_version" value=""/>
        <capability name="mobile_browser_version" value=""/>
        <capability name="can_assign_phone_number" value="false"/>
        <capability name="is_wireless_device" value="false"/>
        <capability name="is_tablet" value="false"/>
        <capability name="is_smarttv" value="false"/>
      </group>
      <group id="display">
        <capability name="resolution_width" value="800"/>
        <capability name="resolution_height" value="600"/>
        <capability name="ux_full_desktop" value="false"/>
        <capability name="pointing_method" value=""/>
        <capability name="max_image_width" value="600"/>
      </group>
      <group id="markup">
        <capability name="preferred_markup" value="html_web_4_0"/>
        <capability name="xhtml_support_level" value="4"/>
      </group>
    </device>
    <device id="generic_web_browser" user_agent="Mozilla/5.0 (Windows NT 10.0; Win64; x64)" parent="generic">
      <group id="display">
        <capability name="ux_full_desktop" value="true"/>
        <capability name="pointing_method" value="mouse"/>
        <capability name="resolution_width" value="1920"/>
        <capability name="resolution_height" value="1080"/>
      </group>
    </device>
    <device id="generic_android" user_agent="Android" parent="generic">
      <group id="product_info">
        <capability name="device_os" value="Android"/>
        <capability name="is_wireless_device" value="true"/>
      </group>
      <group id="display">
        <capability name="pointing_method" value="touchscreen"/>
      </group>
    </device>
    <device id="acme_a1" user_agent="Android; Acme A1" parent="generic_android" actual_device_root="true">
      <group id="product_info">
        <capability name="brand_name" value="Acme"/>
        <capability name="model_name" value="A1"/>
        <capability name="marketing_name" value="Acme One"/>
        <capability name="device_os_version" value="14.0"/>
        <capability name="can_assign_phone_number" value="true"/>
      </group>
      <group id="display">
        <capability name="resolution_width" value="1080"/>
        <capability name="resolution_height" value="2400"/>
      </group>
    </device>
    <device id="acme_a1_chrome" user_agent="Android; Acme A1 Build/Chrome" parent="acme_a1">
      <group id="product_info">
        <capability name="mobile_browser_version" value="120"/>
      </group>
    </device>
    <device id="bravo_tab" user_agent="Android; Bravo Tab" parent="generic_android" actual_device_root="true">
      <group id="product_info">
        <capability name="brand_name" value="Bravo"/>
        <capability name="model_name" value="Tab"/>
        <capability name="is_tablet" value="true"/>
      </group>
      <group id="display">
        <capability name="resolution_width" value="1600"/>
        <capability name="resolution_height" value="2560"/>
      </group>
    </device>
  </devices>
</device_repository>
"#;

fn write_repo(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

fn loaded_engine() -> (Engine, NamedTempFile) {
    let file = write_repo(FIXTURE);
    let mut engine = Engine::new();
    engine.set_root(file.path()).unwrap();
    engine.load().unwrap();
    (engine, file)
}

#[test]
fn resolve_unions_ancestors_with_nearer_overrides_winning() {
    let (engine, _file) = loaded_engine();
    let device = engine.lookup_device_id("acme_a1").unwrap();

    // Own override.
    assert_eq!(device.capability("brand_name").unwrap(), "Acme");
    // Inherited from generic_android.
    assert_eq!(device.capability("device_os").unwrap(), "Android");
    assert_eq!(device.capability("pointing_method").unwrap(), "touchscreen");
    // Inherited from the root.
    assert_eq!(device.capability("preferred_markup").unwrap(), "html_web_4_0");
    // Override shadows the root's value.
    assert_eq!(device.capability_as_int("resolution_width").unwrap(), 1080);
}

#[test]
fn cyclic_hierarchy_fails_load_but_engine_recovers() {
    let bad = write_repo(
        r#"<device_repository><devices>
            <device id="a" user_agent="A" parent="b"/>
            <device id="b" user_agent="B" parent="a"/>
        </devices></device_repository>"#,
    );

    let mut engine = Engine::new();
    engine.set_root(bad.path()).unwrap();
    let err = engine.load().unwrap_err();
    assert!(matches!(
        err,
        DetectError::DeviceHierarchyCircularReference(_)
    ));
    assert_eq!(engine.state(), EngineState::RootSet);

    // Same engine, fresh root, clean load.
    let good = write_repo(FIXTURE);
    engine.set_root(good.path()).unwrap();
    engine.load().unwrap();
    assert_eq!(engine.state(), EngineState::Loaded);
    assert!(engine.lookup_user_agent("Android; Acme A1").is_ok());
}

#[test]
fn lookup_is_deterministic() {
    let (engine, _file) = loaded_engine();
    let ua = "Mozilla/5.0 (Linux; Android; Acme A1 Build/U) AppleWebKit/537.36";
    let first = engine.lookup_user_agent(ua).unwrap();
    let second = engine.lookup_user_agent(ua).unwrap();
    assert_eq!(first.id(), second.id());
    assert_eq!(first.id(), "acme_a1");
}

#[test]
fn longest_pattern_wins() {
    let (engine, _file) = loaded_engine();

    let chrome = engine
        .lookup_user_agent("Mozilla/5.0 (Linux; Android; Acme A1 Build/Chrome) Safari")
        .unwrap();
    assert_eq!(chrome.id(), "acme_a1_chrome");

    let plain = engine
        .lookup_user_agent("Mozilla/5.0 (Linux; Android; Acme A1) Safari")
        .unwrap();
    assert_eq!(plain.id(), "acme_a1");

    let unknown = engine.lookup_user_agent("WeirdBot/0.1").unwrap();
    assert_eq!(unknown.id(), "generic");
}

#[test]
fn two_stage_cache_evicts_user_agents_but_keeps_devices() {
    let file = write_repo(FIXTURE);
    let mut engine = Engine::new();
    engine.set_root(file.path()).unwrap();
    engine
        .set_cache_provider(CacheProvider::DoubleLru, &[2, 2])
        .unwrap();
    engine.load().unwrap();

    // Three distinct user agents collapsing onto two devices.
    let uas = [
        "Mozilla/5.0 (Linux; Android; Acme A1) AppleWebKit",
        "Opera/9.80 (Linux; Android; Acme A1) Presto",
        "Mozilla/5.0 (Linux; Android; Bravo Tab) AppleWebKit",
    ];
    for ua in uas {
        engine.lookup_user_agent(ua).unwrap();
    }

    let stats = engine.stats();
    assert_eq!(stats.user_agent_cache_entries, 2);
    assert_eq!(stats.device_cache_entries, 2);
    // Second Acme lookup resolved a device already in stage 2.
    assert_eq!(stats.device_cache_hits, 1);
    assert_eq!(stats.user_agent_cache_hits, 0);

    // The first user agent was the LRU entry, so it is gone from stage 1,
    // but its device is still resident in stage 2.
    let before = engine.stats().device_cache_hits;
    engine.lookup_user_agent(uas[0]).unwrap();
    let stats = engine.stats();
    assert_eq!(stats.user_agent_cache_hits, 0);
    assert_eq!(stats.device_cache_hits, before + 1);
}

#[test]
fn cache_provider_sizes_are_validated() {
    let mut engine = Engine::new();
    let err = engine
        .set_cache_provider(CacheProvider::Lru, &[0])
        .unwrap_err();
    assert!(matches!(err, DetectError::InvalidCacheSize(0)));

    // Double LRU with no sizes falls back to (10000, 3000).
    engine
        .set_cache_provider(CacheProvider::DoubleLru, &[])
        .unwrap();
}

#[test]
fn requested_capabilities_bound_the_loaded_set() {
    let file = write_repo(FIXTURE);
    let mut engine = Engine::new();
    engine.set_root(file.path()).unwrap();
    engine
        .request_capabilities(["brand_name", "resolution_width"])
        .unwrap();
    engine.load().unwrap();

    // Everything requested is present.
    assert!(engine.has_capability("brand_name"));
    assert!(engine.has_capability("resolution_width"));
    // Mandatory capabilities ride along with a reduced set.
    for name in MANDATORY_CAPABILITIES {
        assert!(engine.has_capability(name), "missing mandatory {name}");
    }
    // A non-requested, non-mandatory capability stays out of memory...
    assert!(!engine.has_capability("max_image_width"));
    // ...but its name is still known to the repository.
    assert!(engine.is_capability_known("max_image_width"));

    let device = engine.lookup_user_agent("Android; Acme A1").unwrap();
    assert!(device.has_capability("brand_name"));
    assert!(!device.has_capability("max_image_width"));

    // Requesting more after load is rejected.
    assert!(matches!(
        engine.request_capability("model_name").unwrap_err(),
        DetectError::AlreadyLoaded
    ));
}

#[test]
fn lifecycle_violations_are_state_errors() {
    let engine = Engine::new();
    assert!(matches!(
        engine.lookup_user_agent("Foo/1.0").unwrap_err(),
        DetectError::NotLoaded
    ));

    let (mut engine, _file) = loaded_engine();
    assert!(matches!(engine.load().unwrap_err(), DetectError::AlreadyLoaded));
    assert!(matches!(
        engine.set_root("/elsewhere.xml").unwrap_err(),
        DetectError::AlreadyLoaded
    ));
    assert!(matches!(
        engine.set_engine_target(EngineTarget::HighAccuracy).unwrap_err(),
        DetectError::AlreadyLoaded
    ));
}

#[test]
fn empty_inputs_are_rejected() {
    let (engine, _file) = loaded_engine();
    assert!(matches!(
        engine.lookup_user_agent("").unwrap_err(),
        DetectError::InvalidParameter(_)
    ));
    assert!(matches!(
        engine.lookup_user_agent("   ").unwrap_err(),
        DetectError::InvalidParameter(_)
    ));
    assert!(matches!(
        engine.lookup_device_id("").unwrap_err(),
        DetectError::EmptyId
    ));
    assert!(matches!(
        engine.lookup_device_id("no_such_device").unwrap_err(),
        DetectError::DeviceNotFound(_)
    ));
}

#[test]
fn missing_root_file_fails_load_and_close_is_safe() {
    let mut engine = Engine::new();
    engine.set_root("/nonexistent/devices.xml").unwrap();
    assert!(matches!(
        engine.load().unwrap_err(),
        DetectError::FileNotFound(_)
    ));
    engine.close();
    engine.close();
}

#[test]
fn patches_override_and_extend_the_root() {
    let root = write_repo(FIXTURE);
    let patch = write_repo(
        r#"<device_repository>
  <devices>
    <device id="acme_a1">
      <group id="product_info">
        <capability name="device_os_version" value="15.0"/>
      </group>
    </device>
    <device id="acme_a2" user_agent="Android; Acme A2" parent="acme_a1" actual_device_root="true">
      <group id="product_info">
        <capability name="model_name" value="A2"/>
      </group>
    </device>
  </devices>
</device_repository>"#,
    );

    let mut engine = Engine::new();
    engine.set_root(root.path()).unwrap();
    engine.add_patch(patch.path()).unwrap();
    engine.load().unwrap();

    let patched = engine.lookup_device_id("acme_a1").unwrap();
    assert_eq!(patched.capability("device_os_version").unwrap(), "15.0");

    let added = engine.lookup_user_agent("Android; Acme A2").unwrap();
    assert_eq!(added.id(), "acme_a2");
    assert_eq!(added.capability("model_name").unwrap(), "A2");
    // Inherits through the patched device up to the root.
    assert_eq!(added.capability("brand_name").unwrap(), "Acme");
}

#[test]
fn high_accuracy_target_recovers_near_misses() {
    let root = write_repo(FIXTURE);
    let mut engine = Engine::new();
    engine.set_root(root.path()).unwrap();
    engine.set_engine_target(EngineTarget::HighAccuracy).unwrap();
    engine.load().unwrap();
    assert_eq!(engine.engine_target(), EngineTarget::HighAccuracy);

    // No fixture pattern is a substring of this agent, but it shares a
    // long prefix with the desktop browser pattern.
    let device = engine
        .lookup_user_agent("Mozilla/5.0 (Windows NT 11.0; ARM64)")
        .unwrap();
    assert_eq!(device.id(), "generic_web_browser");
}

#[test]
fn virtual_capabilities_derive_from_the_snapshot() {
    let (engine, _file) = loaded_engine();

    let phone = engine.lookup_user_agent("Android; Acme A1").unwrap();
    assert!(phone.has_virtual_capability("is_smartphone"));
    assert_eq!(phone.virtual_capability("is_smartphone").unwrap(), "true");
    assert_eq!(phone.virtual_capability("form_factor").unwrap(), "Smartphone");
    assert_eq!(phone.virtual_capability("is_android").unwrap(), "true");
    assert_eq!(
        phone.virtual_capability("complete_device_name").unwrap(),
        "Acme Acme One"
    );

    let tablet = engine.lookup_user_agent("Android; Bravo Tab").unwrap();
    assert_eq!(tablet.virtual_capability("form_factor").unwrap(), "Tablet");

    let desktop = engine
        .lookup_user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64)")
        .unwrap();
    assert_eq!(desktop.virtual_capability("form_factor").unwrap(), "Desktop");
    assert_eq!(desktop.virtual_capability("is_mobile").unwrap(), "false");

    assert!(matches!(
        phone.virtual_capability("is_sentient").unwrap_err(),
        DetectError::VirtualCapabilityNotFound(_)
    ));

    let all = phone.virtual_capabilities();
    assert_eq!(all.get("is_largescreen").map(String::as_str), Some("true"));
}

#[test]
fn group_queries_distinguish_missing_and_mismatched() {
    let (engine, _file) = loaded_engine();

    let display = engine.capabilities_in_group("display").unwrap();
    assert!(display.contains(&"resolution_width".to_string()));

    assert!(matches!(
        engine.capabilities_in_group("no_such_group").unwrap_err(),
        DetectError::CapabilityGroupNotFound(_)
    ));

    let device = engine.lookup_user_agent("Android; Acme A1").unwrap();
    assert_eq!(
        device.capability_in_group("product_info", "brand_name").unwrap(),
        "Acme"
    );
    assert!(matches!(
        device
            .capability_in_group("display", "brand_name")
            .unwrap_err(),
        DetectError::CapabilityGroupMismatch { .. }
    ));
}

#[test]
fn typed_capability_getters_validate_values() {
    let (engine, _file) = loaded_engine();
    let device = engine.lookup_user_agent("Android; Acme A1").unwrap();

    assert_eq!(device.capability_as_int("resolution_height").unwrap(), 2400);
    assert!(device.capability_as_bool("can_assign_phone_number").unwrap());
    assert!(matches!(
        device.capability_as_int("brand_name").unwrap_err(),
        DetectError::InvalidCapabilityValue { .. }
    ));
    assert!(matches!(
        device.capability("no_such_cap").unwrap_err(),
        DetectError::CapabilityNotFound(_)
    ));
}

#[test]
fn info_and_stats_report_the_loaded_repository() {
    let (engine, _file) = loaded_engine();

    let info = engine.info().unwrap();
    assert!(info.contains("2024-06"), "info was {info:?}");
    assert!(info.contains("6 devices"), "info was {info:?}");

    engine.lookup_user_agent("Android; Acme A1").unwrap();
    let stats = engine.stats();
    assert_eq!(stats.lookups, 1);
    assert_eq!(stats.devices_loaded, 6);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["lookups"], 1);
    assert_eq!(json["devices_loaded"], 6);
}

#[test]
fn capability_enumeration_is_sorted_and_complete() {
    let (engine, _file) = loaded_engine();
    let caps = engine.capabilities().unwrap();

    let mut sorted = caps.clone();
    sorted.sort();
    assert_eq!(caps, sorted);
    assert!(caps.len() >= MANDATORY_CAPABILITIES.len());
    for name in MANDATORY_CAPABILITIES {
        assert!(caps.contains(&name.to_string()), "missing {name}");
    }
}

#[test]
fn concurrent_lookups_agree_with_serial_results() {
    let (engine, _file) = loaded_engine();
    let uas = [
        "Mozilla/5.0 (Linux; Android; Acme A1) AppleWebKit",
        "Mozilla/5.0 (Linux; Android; Bravo Tab) AppleWebKit",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64)",
        "WeirdBot/0.1",
    ];
    let expected: Vec<String> = uas
        .iter()
        .map(|ua| engine.lookup_user_agent(ua).unwrap().id().to_string())
        .collect();

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..50 {
                    for (ua, want) in uas.iter().zip(&expected) {
                        let got = engine.lookup_user_agent(ua).unwrap();
                        assert_eq!(got.id(), want.as_str());
                    }
                }
            });
        }
    });
}
