//! Butcher tableaux for the embedded Runge-Kutta stepper.

/// Coefficients of an explicit Runge-Kutta scheme of order `ORDER` with
/// `STAGES` stages. `b_tilde` holds the embedded lower-order weights used
/// for the error estimate; schemes without an embedded pair leave it unset.
#[derive(Clone, Copy, Debug)]
pub struct ButcherTableau<const ORDER: usize, const STAGES: usize> {
    pub a: [[f64; STAGES]; STAGES],
    pub b: [f64; STAGES],
    pub b_tilde: Option<[f64; STAGES]>,
    pub c: [f64; STAGES],
    /// First-same-as-last: the final stage is evaluated at the step end
    /// point and can seed the next step.
    pub fsal: bool,
}

impl ButcherTableau<4, 4> {
    /// Classical 4th-order Runge-Kutta; no embedded error estimate.
    pub const RK4: Self = Self {
        a: [
            [0., 0., 0., 0.],
            [1. / 2., 0., 0., 0.],
            [0., 1. / 2., 0., 0.],
            [0., 0., 1., 0.],
        ],
        b: [1. / 6., 1. / 3., 1. / 3., 1. / 6.],
        b_tilde: None,
        c: [0., 1. / 2., 1. / 2., 1.],
        fsal: false,
    };
}

impl ButcherTableau<5, 7> {
    /// Dormand-Prince 5(4), the default adaptive scheme.
    pub const DORMAND_PRINCE45: Self = Self {
        a: [
            [0., 0., 0., 0., 0., 0., 0.],
            [1. / 5., 0., 0., 0., 0., 0., 0.],
            [3. / 40., 9. / 40., 0., 0., 0., 0., 0.],
            [44. / 45., -56. / 15., 32. / 9., 0., 0., 0., 0.],
            [
                19372. / 6561.,
                -25360. / 2187.,
                64448. / 6561.,
                -212. / 729.,
                0.,
                0.,
                0.,
            ],
            [
                9017. / 3168.,
                -355. / 33.,
                46732. / 5247.,
                49. / 176.,
                -5103. / 18656.,
                0.,
                0.,
            ],
            [
                35. / 384.,
                0.,
                500. / 1113.,
                125. / 192.,
                -2187. / 6784.,
                11. / 84.,
                0.,
            ],
        ],
        b: [
            35. / 384.,
            0.,
            500. / 1113.,
            125. / 192.,
            -2187. / 6784.,
            11. / 84.,
            0.,
        ],
        b_tilde: Some([
            5179. / 57600.,
            0.,
            7571. / 16695.,
            393. / 640.,
            -92097. / 339200.,
            187. / 2100.,
            1. / 40.,
        ]),
        c: [0., 1. / 5., 3. / 10., 4. / 5., 8. / 9., 1., 1.],
        fsal: true,
    };
}
