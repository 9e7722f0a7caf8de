use converter_config::load_toml;

fn minimal_toml(iter_period: &str) -> String {
    format!(
        r#"
iter_period = {iter_period}

[load]
ohms_ser = 0.5
ohms_par = 1.0e9
ohms_mag = 2.0
henrys = 1.0
gauss_per_amp = 1.0

[field.limits]
pos = 1000.0
neg = -1000.0

[current.limits]
pos = 1000.0
neg = -1000.0

[voltage.limits]
pos = 1000.0
neg = -1000.0

[ref_clip]
pos = 100.0
min = 0.0
neg = -100.0
rate = 1.0e6
"#
    )
}

#[test]
fn rejects_nonpositive_iter_period_from_full_document() {
    let toml = minimal_toml("0.0");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject iter_period=0");
    assert!(format!("{err}").to_lowercase().contains("iter_period must be > 0"));
}

#[test]
fn accepts_a_well_formed_scenario_document() {
    let toml = minimal_toml("0.001");
    let cfg = load_toml(&toml).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
}

#[test]
fn rejects_inverted_ref_clip_bounds_from_full_document() {
    let mut toml = minimal_toml("0.001");
    toml = toml.replace("pos = 100.0\nmin = 0.0\nneg = -100.0", "pos = -100.0\nmin = 0.0\nneg = 100.0");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject pos <= neg");
    assert!(format!("{err}").to_lowercase().contains("ref_clip.pos must be > ref_clip.neg"));
}

#[test]
fn rejects_two_aux_poles_rst_without_frequency() {
    let mut toml = minimal_toml("0.001");
    toml.push_str(
        r#"
[current_rst]
algorithm = "two_aux_poles"
"#,
    );
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject missing auxpoles2_hz");
    assert!(format!("{err}").contains("current_rst.auxpoles2_hz"));
}
