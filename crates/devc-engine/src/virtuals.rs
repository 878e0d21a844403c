//! Built-in virtual capabilities
//!
//! Virtual capabilities are derived from stored capabilities on demand;
//! nothing here is persisted. Every compute function is pure and total:
//! missing inputs degrade to empty strings or `false`, never to errors.

use devc_common::Capabilities;

pub(crate) type VirtualFn = fn(&Capabilities) -> String;

/// Name-sorted table of the virtual capabilities the engine can compute.
pub(crate) const VIRTUAL_CAPABILITIES: &[(&str, VirtualFn)] = &[
    ("advertised_browser_version", advertised_browser_version),
    ("advertised_device_os", advertised_device_os),
    ("advertised_device_os_version", advertised_device_os_version),
    ("complete_device_name", complete_device_name),
    ("device_name", device_name),
    ("form_factor", form_factor),
    ("is_android", is_android),
    ("is_full_desktop", is_full_desktop),
    ("is_ios", is_ios),
    ("is_largescreen", is_largescreen),
    ("is_mobile", is_mobile),
    ("is_smartphone", is_smartphone),
    ("is_touchscreen", is_touchscreen),
    ("is_windows_phone", is_windows_phone),
];

pub(crate) fn lookup(name: &str) -> Option<VirtualFn> {
    VIRTUAL_CAPABILITIES
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, compute)| *compute)
}

fn value<'a>(caps: &'a Capabilities, name: &str) -> &'a str {
    caps.get(name).map(String::as_str).unwrap_or("")
}

fn truthy(caps: &Capabilities, name: &str) -> bool {
    value(caps, name) == "true"
}

fn int(caps: &Capabilities, name: &str) -> i64 {
    value(caps, name).parse().unwrap_or(0)
}

fn flag(condition: bool) -> String {
    if condition { "true" } else { "false" }.to_string()
}

fn advertised_device_os(caps: &Capabilities) -> String {
    value(caps, "device_os").to_string()
}

fn advertised_device_os_version(caps: &Capabilities) -> String {
    value(caps, "device_os_version").to_string()
}

fn advertised_browser_version(caps: &Capabilities) -> String {
    value(caps, "mobile_browser_version").to_string()
}

/// Brand plus model, e.g. "Acme A1".
fn device_name(caps: &Capabilities) -> String {
    join_nonempty(&[value(caps, "brand_name"), value(caps, "model_name")])
}

/// Brand plus marketing name when one exists, model name otherwise.
fn complete_device_name(caps: &Capabilities) -> String {
    let marketing = value(caps, "marketing_name");
    let model = if marketing.is_empty() {
        value(caps, "model_name")
    } else {
        marketing
    };
    join_nonempty(&[value(caps, "brand_name"), model])
}

fn join_nonempty(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

fn form_factor(caps: &Capabilities) -> String {
    let factor = if truthy(caps, "ux_full_desktop") {
        "Desktop"
    } else if truthy(caps, "is_smarttv") {
        "Smart-TV"
    } else if truthy(caps, "is_tablet") {
        "Tablet"
    } else if smartphone(caps) {
        "Smartphone"
    } else if truthy(caps, "is_wireless_device") {
        "Feature Phone"
    } else {
        "Other"
    };
    factor.to_string()
}

fn is_android(caps: &Capabilities) -> String {
    flag(value(caps, "device_os").eq_ignore_ascii_case("android"))
}

fn is_ios(caps: &Capabilities) -> String {
    let os = value(caps, "device_os");
    flag(os.eq_ignore_ascii_case("ios") || os.eq_ignore_ascii_case("iphone os"))
}

fn is_windows_phone(caps: &Capabilities) -> String {
    flag(value(caps, "device_os")
        .to_ascii_lowercase()
        .starts_with("windows phone"))
}

fn is_mobile(caps: &Capabilities) -> String {
    flag(truthy(caps, "is_wireless_device"))
}

fn is_full_desktop(caps: &Capabilities) -> String {
    flag(truthy(caps, "ux_full_desktop"))
}

fn is_touchscreen(caps: &Capabilities) -> String {
    flag(value(caps, "pointing_method") == "touchscreen")
}

fn is_largescreen(caps: &Capabilities) -> String {
    flag(int(caps, "resolution_width") >= 480 && int(caps, "resolution_height") >= 480)
}

fn smartphone(caps: &Capabilities) -> bool {
    truthy(caps, "is_wireless_device")
        && !truthy(caps, "is_tablet")
        && !truthy(caps, "is_smarttv")
        && value(caps, "pointing_method") == "touchscreen"
        && int(caps, "resolution_width") >= 320
        && !value(caps, "device_os").is_empty()
}

fn is_smartphone(caps: &Capabilities) -> String {
    flag(smartphone(caps))
}
