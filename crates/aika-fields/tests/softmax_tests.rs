// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]
//! Softmax composed of exp, sum and div fields.

use aika_dry_tests::{build_softmax, Softmax};
use aika_fields::{Document, ObjId};

const EPS: f64 = 1e-9;

struct Wired {
    doc: Document,
    norm: ObjId,
    tokens: Vec<ObjId>,
    outputs: Vec<ObjId>,
}

fn wire(fixture: &Softmax, n: usize) -> Wired {
    let layout = fixture.layout;
    let mut doc = fixture.document();
    let norm = doc.instantiate(layout.norm_type).unwrap();
    let mut tokens = Vec::new();
    let mut outputs = Vec::new();
    for _ in 0..n {
        let t = doc.instantiate(layout.input_type).unwrap();
        let o = doc.instantiate(layout.output_type).unwrap();
        doc.connect(layout.norm_inputs, norm, t).unwrap();
        doc.connect(layout.output_input, o, t).unwrap();
        doc.connect(layout.output_norm, o, norm).unwrap();
        tokens.push(t);
        outputs.push(o);
    }
    Wired {
        doc,
        norm,
        tokens,
        outputs,
    }
}

fn expected(xs: &[f64]) -> Vec<f64> {
    let total: f64 = xs.iter().map(|x| x.exp()).sum();
    xs.iter().map(|x| x.exp() / total).collect()
}

fn outputs(w: &Wired, fixture: &Softmax) -> Vec<f64> {
    w.outputs
        .iter()
        .map(|&o| w.doc.field_value(o, fixture.fields.outputs()).unwrap())
        .collect()
}

#[test]
fn outputs_are_normalized_exponentials() {
    let fixture = build_softmax();
    let mut w = wire(&fixture, 3);
    let xs = [0.5, 1.0, -2.0];
    for (&t, &x) in w.tokens.iter().zip(&xs) {
        w.doc.set_field_value(t, fixture.x, x).unwrap();
    }

    let norm = w.doc.field_value(w.norm, fixture.fields.norm()).unwrap();
    let total: f64 = xs.iter().map(|x| x.exp()).sum();
    assert!((norm - total).abs() < EPS);

    let got = outputs(&w, &fixture);
    for (g, e) in got.iter().zip(expected(&xs)) {
        assert!((g - e).abs() < EPS, "{g} != {e}");
    }
    assert!((got.iter().sum::<f64>() - 1.0).abs() < EPS);
}

#[test]
fn changing_one_input_renormalizes_every_output() {
    let fixture = build_softmax();
    let mut w = wire(&fixture, 4);
    let mut xs = vec![0.0, 0.25, 0.5, 0.75];
    for (&t, &x) in w.tokens.iter().zip(&xs) {
        w.doc.set_field_value(t, fixture.x, x).unwrap();
    }

    xs[2] = 3.0;
    w.doc.set_field_value(w.tokens[2], fixture.x, xs[2]).unwrap();
    let got = outputs(&w, &fixture);
    for (g, e) in got.iter().zip(expected(&xs)) {
        assert!((g - e).abs() < EPS, "{g} != {e}");
    }
    assert!(got[2] > got[3]);
}

#[test]
fn exp_fields_join_the_norm_once_an_input_cell_exists() {
    let fixture = build_softmax();
    let mut w = wire(&fixture, 2);
    w.doc.set_field_value(w.tokens[0], fixture.x, 1.0).unwrap();

    // The second exp field never fired, so it holds no value yet and the
    // norm only counts exp(1).
    let only = w.doc.field_value(w.outputs[0], fixture.fields.outputs()).unwrap();
    assert!((only - 1.0).abs() < EPS);
    let idle = w.doc.field_value(w.outputs[1], fixture.fields.outputs()).unwrap();
    assert!(idle.abs() < EPS);

    // Without an input cell there is nothing for init to seed exp(0) from.
    w.doc.init_fields(w.tokens[1]).unwrap();
    assert!(w.doc.field(w.tokens[1], fixture.fields.inputs()).unwrap().is_none());

    // Writing the unchanged zero creates the input cell; init then seeds it.
    w.doc.set_field_value(w.tokens[1], fixture.x, 0.0).unwrap();
    assert!(w.doc.field(w.tokens[1], fixture.fields.inputs()).unwrap().is_none());
    w.doc.init_fields(w.tokens[1]).unwrap();
    let got = outputs(&w, &fixture);
    for (g, e) in got.iter().zip(expected(&[1.0, 0.0])) {
        assert!((g - e).abs() < EPS, "{g} != {e}");
    }
}
