use super::*;

#[test]
fn text_form_parses_bracketed_and_bare_terms() {
    let s: StepSchedule = "[12]*400+[4]*600".parse().unwrap();
    assert_eq!(
        s.segments(),
        &[
            ScheduleSegment {
                value: 12.0,
                span: 400
            },
            ScheduleSegment {
                value: 4.0,
                span: 600
            },
        ]
    );
    let bare: StepSchedule = " 12 * 400 + 4*600 ".parse().unwrap();
    assert_eq!(bare, s);
    assert_eq!(s.to_string().parse::<StepSchedule>().unwrap(), s);
}

#[test]
fn malformed_text_is_rejected() {
    for bad in ["", "[12]*", "12*0", "x*3", "[1]*2+", "1*-4"] {
        assert!(bad.parse::<StepSchedule>().is_err(), "{bad}");
    }
}

#[test]
fn resolved_length_always_equals_steps() {
    let s: StepSchedule = "[12]*400+[4]*600".parse().unwrap();
    for steps in [1usize, 7, 250, 1000, 1337] {
        assert_eq!(s.resolve(steps).unwrap().len(), steps);
    }
}

#[test]
fn resolution_keeps_segment_proportions() {
    let s: StepSchedule = "[12]*400+[4]*600".parse().unwrap();
    let v = s.resolve(250).unwrap();
    assert_eq!(v.iter().filter(|&&x| x == 12.0).count(), 100);
    assert_eq!(v[0], 12.0);
    assert_eq!(v[249], 4.0);
}

#[test]
fn json_accepts_text_and_segments() {
    let a: StepSchedule = serde_json::from_str("\"[0.2]*400+[0]*600\"").unwrap();
    let b: StepSchedule =
        serde_json::from_str(r#"[{"value":0.2,"span":400},{"value":0,"span":600}]"#).unwrap();
    assert_eq!(a, b);
    assert!(serde_json::from_str::<StepSchedule>("\"[1]*0\"").is_err());
}

#[test]
fn lookup_is_by_steps_remaining() {
    let sched = CutoutSchedule::default().resolve(10).unwrap();
    assert_eq!(sched.len(), 10);

    let first = sched.at(StepsRemaining(9));
    assert_eq!(first.overview, 12);
    assert_eq!(first.innercut, 4);
    assert_eq!(first.ic_gray_p, 0.2);

    let last = sched.at(StepsRemaining(0));
    assert_eq!(last.overview, 4);
    assert_eq!(last.innercut, 12);
    assert_eq!(last.total(), 16);
}

#[test]
fn lookup_at_bounds_never_panics() {
    let sched = CutoutSchedule::default().resolve(25).unwrap();
    let _ = sched.at(StepsRemaining(0));
    let _ = sched.at(StepsRemaining(25));
    let _ = sched.at(StepsRemaining(usize::MAX));
    assert_eq!(sched.at(StepsRemaining(25)), sched.at(StepsRemaining(24)));
}

#[test]
fn fractional_counts_are_rejected() {
    let sched = CutoutSchedule {
        overview: StepSchedule::constant(2.5).unwrap(),
        ..CutoutSchedule::default()
    };
    assert!(matches!(sched.resolve(10), Err(DiscoError::Config(_))));
}

#[test]
fn steps_without_cutouts_are_rejected() {
    let sched = CutoutSchedule {
        overview: StepSchedule::constant(0.0).unwrap(),
        innercut: "[4]*1+[0]*1".parse().unwrap(),
        ic_gray_p: StepSchedule::constant(0.0).unwrap(),
    };
    assert!(sched.resolve(4).is_err());
}

#[test]
fn gray_fraction_must_be_a_probability() {
    let sched = CutoutSchedule {
        ic_gray_p: StepSchedule::constant(1.5).unwrap(),
        ..CutoutSchedule::default()
    };
    assert!(sched.resolve(4).is_err());
}

#[test]
fn oversized_counts_are_rejected() {
    let sched = CutoutSchedule {
        overview: "[1e20]".parse().unwrap(),
        innercut: StepSchedule::constant(4.0).unwrap(),
        ic_gray_p: StepSchedule::constant(0.0).unwrap(),
    };
    assert!(matches!(sched.resolve(10), Err(DiscoError::Config(_))));

    let at_bound = CutoutSchedule {
        overview: StepSchedule::constant(MAX_CUTOUTS_PER_STEP as f64).unwrap(),
        ..sched.clone()
    };
    let params = at_bound.resolve(10).unwrap().at(StepsRemaining(0));
    assert_eq!(params.total(), MAX_CUTOUTS_PER_STEP + 4);
}

#[test]
fn total_saturates() {
    let p = CutoutParams {
        overview: usize::MAX,
        innercut: 1,
        ic_gray_p: 0.0,
    };
    assert_eq!(p.total(), usize::MAX);
}
