//! Dormand-Prince 5(4) coefficients.
//!
//! The classical embedded pair, written as a 7-stage FSAL tableau: the final
//! row of the stage matrix equals the 5th-order weights, so the last stage
//! derivative is f(t1, y1) and doubles as the first stage of the next step.

use crate::tableau::ButcherTableau;

/// Order used for step-size scaling.
pub const ORDER: usize = 5;

/// Midpoint weights for dense output.
///
/// `y_mid = y0 + h * sum(MID[i] * k[i])` estimates the solution at the step
/// midpoint to the accuracy of the pair, which is what the quartic
/// interpolant is fitted against.
pub const MID: [f64; 7] = [
    6_025_192_743.0 / 30_085_553_152.0 / 2.0,
    0.0,
    51_252_292_925.0 / 65_400_821_598.0 / 2.0,
    -2_691_868_925.0 / 45_128_329_728.0 / 2.0,
    187_940_372_067.0 / 1_594_534_317_056.0 / 2.0,
    -1_776_094_331.0 / 19_743_644_256.0 / 2.0,
    11_237_099.0 / 235_043_384.0 / 2.0,
];

/// Build the Dormand-Prince 5(4) tableau.
pub fn tableau() -> ButcherTableau {
    ButcherTableau {
        a: vec![
            vec![1.0 / 5.0],
            vec![3.0 / 40.0, 9.0 / 40.0],
            vec![44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0],
            vec![
                19372.0 / 6561.0,
                -25360.0 / 2187.0,
                64448.0 / 6561.0,
                -212.0 / 729.0,
            ],
            vec![
                9017.0 / 3168.0,
                -355.0 / 33.0,
                46732.0 / 5247.0,
                49.0 / 176.0,
                -5103.0 / 18656.0,
            ],
            vec![
                35.0 / 384.0,
                0.0,
                500.0 / 1113.0,
                125.0 / 192.0,
                -2187.0 / 6784.0,
                11.0 / 84.0,
            ],
        ],
        b: vec![
            35.0 / 384.0,
            0.0,
            500.0 / 1113.0,
            125.0 / 192.0,
            -2187.0 / 6784.0,
            11.0 / 84.0,
            0.0,
        ],
        b_star: vec![
            5179.0 / 57600.0,
            0.0,
            7571.0 / 16695.0,
            393.0 / 640.0,
            -92097.0 / 339200.0,
            187.0 / 2100.0,
            1.0 / 40.0,
        ],
        c: vec![1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0],
        order: ORDER,
    }
}
