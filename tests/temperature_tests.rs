use watts_vision::{FROST_PROTECTION, Mode, Temperature};

#[test]
fn raw_tenths_of_fahrenheit() {
    let t = Temperature::from_raw(689);
    assert_eq!(t.raw(), 689);
    assert!((t.fahrenheit() - 68.9).abs() < 1e-9);
    assert!((t.celsius() - 20.5).abs() < 0.01);
    assert_eq!(t.raw_string(), "689");
}

#[test]
fn from_degrees_rounds_to_tenths() {
    assert_eq!(Temperature::from_fahrenheit(71.56).raw(), 716);
    assert_eq!(Temperature::from_celsius(20.0).raw(), 680);
    assert_eq!(Temperature::from_celsius(7.0).raw(), 446);
}

#[test]
fn parse_vendor_strings() {
    assert_eq!(Temperature::parse("215"), Some(Temperature::from_raw(215)));
    assert_eq!(Temperature::parse(" 215 "), Some(Temperature::from_raw(215)));
    assert_eq!(Temperature::parse("215.0"), Some(Temperature::from_raw(215)));
    assert_eq!(Temperature::parse(""), None);
    assert_eq!(Temperature::parse("warm"), None);
}

#[test]
fn frost_protection_constant() {
    assert_eq!(FROST_PROTECTION.raw(), 446);
    assert_eq!(format!("{FROST_PROTECTION}"), "44.6\u{00b0}F");
}

#[test]
fn mode_codes_and_labels() {
    assert_eq!(Mode::from_code("11"), Some(Mode::Program));
    assert_eq!(Mode::from_code("5"), None);
    assert_eq!(Mode::Boost.as_code(), "4");
    assert_eq!(Mode::FrostProtection.label(), "Frost Protection");
    assert_eq!(Mode::from_label("Eco"), Some(Mode::Eco));
    assert_eq!(Mode::Off.setpoint_field(), None);
    assert_eq!(Mode::Program.setpoint_field(), Some("consigne_manuel"));
}
