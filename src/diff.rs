use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::types::*;

/// Collect `(path, old, new)` for every leaf of `current` that differs from
/// `previous`. Keys only present in `previous` are not reported.
pub(crate) fn diff_json(
    previous: &Value,
    current: &Value,
    path_prefix: &str,
    changes: &mut Vec<(String, Value, Value)>,
) {
    match (previous, current) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            for (key, curr_val) in curr_map {
                let path = if path_prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{path_prefix}.{key}")
                };
                match prev_map.get(key) {
                    Some(prev_val) => diff_json(prev_val, curr_val, &path, changes),
                    None if curr_val.is_object() => {
                        diff_json(&Value::Object(Map::new()), curr_val, &path, changes);
                    }
                    None => changes.push((path, Value::Null, curr_val.clone())),
                }
            }
        }
        (prev, curr) if prev != curr => {
            changes.push((path_prefix.to_string(), prev.clone(), curr.clone()));
        }
        _ => {}
    }
}

/// Events describing how one smart home's devices moved from `previous` to
/// `current`. `previous` is `None` when the home was not cached before.
pub(crate) fn smarthome_events(previous: Option<&SmartHome>, current: &SmartHome) -> Vec<Event> {
    let home_id = &current.smarthome_id;
    let old: HashMap<&str, &Device> = previous
        .map(|h| h.devices().map(|d| (d.id.as_str(), d)).collect())
        .unwrap_or_default();

    let mut events = Vec::new();
    for device in current.devices() {
        match old.get(device.id.as_str()) {
            Some(prev) => events.extend(device_events(home_id, prev, device)),
            None => events.push(Event::DeviceAdded {
                smarthome_id: home_id.clone(),
                device_id: device.id.clone(),
            }),
        }
    }

    let mut removed: Vec<&str> = old
        .keys()
        .copied()
        .filter(|id| !current.devices().any(|d| d.id == *id))
        .collect();
    removed.sort_unstable();
    events.extend(removed.into_iter().map(|id| Event::DeviceRemoved {
        smarthome_id: home_id.clone(),
        device_id: id.to_string(),
    }));
    events
}

fn device_events(home_id: &str, previous: &Device, current: &Device) -> Vec<Event> {
    if previous == current {
        return Vec::new();
    }
    let (Ok(prev), Ok(curr)) = (serde_json::to_value(previous), serde_json::to_value(current))
    else {
        return Vec::new();
    };

    let mut changes = Vec::new();
    diff_json(&prev, &curr, "", &mut changes);

    changes
        .into_iter()
        .filter_map(|(path, _old, new)| device_event(home_id, current, &path, new))
        .collect()
}

fn device_event(home_id: &str, device: &Device, path: &str, value: Value) -> Option<Event> {
    let smarthome_id = home_id.to_string();
    let device_id = device.id.clone();
    let event = match path {
        "gv_mode" => Event::ModeChanged {
            smarthome_id,
            device_id,
            mode: device.mode(),
        },
        "temperature_air" => Event::TemperatureChanged {
            smarthome_id,
            device_id,
            temp: device.air_temperature()?,
        },
        "heating_up" => Event::HeatingChanged {
            smarthome_id,
            device_id,
            heating: device.is_heating(),
        },
        _ => Event::DeviceField {
            smarthome_id,
            device_id,
            field: path.to_string(),
            value,
        },
    };
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn home(devices: Value) -> SmartHome {
        serde_json::from_value(json!({
            "smarthome_id": "SH1",
            "zones": [{"zone_label": "Living", "devices": devices}]
        }))
        .unwrap()
    }

    #[test]
    fn diff_reports_changed_leaves() {
        let mut changes = Vec::new();
        diff_json(
            &json!({"a": 1, "b": {"c": "x"}}),
            &json!({"a": 1, "b": {"c": "y"}, "d": true}),
            "",
            &mut changes,
        );
        assert_eq!(changes.len(), 2);
        assert!(changes.contains(&("b.c".to_string(), json!("x"), json!("y"))));
        assert!(changes.contains(&("d".to_string(), Value::Null, json!(true))));
    }

    #[test]
    fn first_load_reports_added_devices() {
        let current = home(json!([{"id": "D1"}, {"id": "D2"}]));
        let events = smarthome_events(None, &current);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e, Event::DeviceAdded { .. })));
    }

    #[test]
    fn typed_and_generic_changes() {
        let prev = home(json!([{"id": "D1", "gv_mode": "0", "temperature_air": "680", "heating_up": "0", "error_code": "0"}]));
        let curr = home(json!([{"id": "D1", "gv_mode": "3", "temperature_air": "690", "heating_up": "1", "error_code": "2"}]));
        let events = smarthome_events(Some(&prev), &curr);

        assert!(events.contains(&Event::ModeChanged {
            smarthome_id: "SH1".into(),
            device_id: "D1".into(),
            mode: Some(Mode::Eco),
        }));
        assert!(events.contains(&Event::TemperatureChanged {
            smarthome_id: "SH1".into(),
            device_id: "D1".into(),
            temp: Temperature::from_raw(690),
        }));
        assert!(events.contains(&Event::HeatingChanged {
            smarthome_id: "SH1".into(),
            device_id: "D1".into(),
            heating: true,
        }));
        assert!(events.iter().any(|e| matches!(
            e,
            Event::DeviceField { field, value, .. } if field == "error_code" && value == "2"
        )));
    }

    #[test]
    fn unchanged_devices_are_silent_and_missing_ones_removed() {
        let prev = home(json!([{"id": "D1", "gv_mode": "0"}, {"id": "D2"}]));
        let curr = home(json!([{"id": "D1", "gv_mode": "0"}]));
        let events = smarthome_events(Some(&prev), &curr);
        assert_eq!(
            events,
            vec![Event::DeviceRemoved {
                smarthome_id: "SH1".into(),
                device_id: "D2".into(),
            }]
        );
    }
}
