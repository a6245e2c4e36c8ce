//! Wigner 3j/6j symbols and the reduced matrix elements built from them.
//!
//! All angular momenta are passed doubled (`two_j = 3` means `j = 3/2`).

use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wigner3jInput {
    pub two_j1: i32,
    pub two_j2: i32,
    pub two_j3: i32,
    pub two_m1: i32,
    pub two_m2: i32,
    pub two_m3: i32,
}

impl Wigner3jInput {
    pub fn new(
        two_j1: i32,
        two_j2: i32,
        two_j3: i32,
        two_m1: i32,
        two_m2: i32,
        two_m3: i32,
    ) -> Self {
        Self {
            two_j1,
            two_j2,
            two_j3,
            two_m1,
            two_m2,
            two_m3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Wigner6jInput {
    pub two_j1: i32,
    pub two_j2: i32,
    pub two_j3: i32,
    pub two_j4: i32,
    pub two_j5: i32,
    pub two_j6: i32,
}

impl Wigner6jInput {
    pub fn new(
        two_j1: i32,
        two_j2: i32,
        two_j3: i32,
        two_j4: i32,
        two_j5: i32,
        two_j6: i32,
    ) -> Self {
        Self {
            two_j1,
            two_j2,
            two_j3,
            two_j4,
            two_j5,
            two_j6,
        }
    }

    fn columns(self) -> [[i32; 2]; 3] {
        [
            [self.two_j1, self.two_j4],
            [self.two_j2, self.two_j5],
            [self.two_j3, self.two_j6],
        ]
    }

    fn from_columns(columns: [[i32; 2]; 3]) -> Self {
        Self::new(
            columns[0][0],
            columns[1][0],
            columns[2][0],
            columns[0][1],
            columns[1][1],
            columns[2][1],
        )
    }

    /// Smallest of the 24 arguments orderings that leave the symbol unchanged
    /// (column permutations and upper/lower swaps of any two columns).
    pub fn canonical(self) -> Self {
        const PERMUTATIONS: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];
        const FLIPS: [[bool; 3]; 4] = [
            [false, false, false],
            [true, true, false],
            [true, false, true],
            [false, true, true],
        ];

        let columns = self.columns();
        let mut best = self;
        for permutation in PERMUTATIONS {
            for flip in FLIPS {
                let mut candidate = [[0; 2]; 3];
                for (slot, source) in permutation.iter().enumerate() {
                    let [upper, lower] = columns[*source];
                    candidate[slot] = if flip[slot] { [lower, upper] } else { [upper, lower] };
                }
                let candidate = Self::from_columns(candidate);
                if candidate < best {
                    best = candidate;
                }
            }
        }
        best
    }
}

const LOG_FACTORIAL_DIM: usize = 128;
static LOG_FACTORIALS: OnceLock<[f64; LOG_FACTORIAL_DIM]> = OnceLock::new();

fn log_factorials() -> &'static [f64; LOG_FACTORIAL_DIM] {
    LOG_FACTORIALS.get_or_init(|| {
        let mut table = [0.0; LOG_FACTORIAL_DIM];
        for n in 2..LOG_FACTORIAL_DIM {
            table[n] = table[n - 1] + (n as f64).ln();
        }
        table
    })
}

/// `ln n!` from the table, summed past its end.
fn ln_factorial(n: i32) -> f64 {
    let table = log_factorials();
    match usize::try_from(n) {
        Ok(index) if index < LOG_FACTORIAL_DIM => table[index],
        Ok(_) => {
            let last = LOG_FACTORIAL_DIM - 1;
            table[last] + (LOG_FACTORIAL_DIM as i32..=n).map(|k| f64::from(k).ln()).sum::<f64>()
        }
        Err(_) => 0.0,
    }
}

/// `true` when `(a, b, c)` (doubled) can couple: triangle rule and integer sum.
pub fn triangle(two_a: i32, two_b: i32, two_c: i32) -> bool {
    two_a >= 0
        && two_b >= 0
        && two_c >= 0
        && two_a + two_b >= two_c
        && two_a + two_c >= two_b
        && two_b + two_c >= two_a
        && (two_a + two_b + two_c) % 2 == 0
}

fn sign_of_power(exponent: i32) -> f64 {
    if exponent.rem_euclid(2) == 0 { 1.0 } else { -1.0 }
}

/// Wigner 3j symbol from the Racah sum.
pub fn wigner_3j(input: Wigner3jInput) -> f64 {
    let Wigner3jInput {
        two_j1,
        two_j2,
        two_j3,
        two_m1,
        two_m2,
        two_m3,
    } = input;

    if two_m1 + two_m2 + two_m3 != 0 || !triangle(two_j1, two_j2, two_j3) {
        return 0.0;
    }
    if two_m1.abs() > two_j1 || two_m2.abs() > two_j2 || two_m3.abs() > two_j3 {
        return 0.0;
    }
    if (two_j1 + two_m1) % 2 != 0 || (two_j2 + two_m2) % 2 != 0 || (two_j3 + two_m3) % 2 != 0 {
        return 0.0;
    }

    // Integer combinations of the (possibly half-integer) arguments.
    let j1_plus_j2_minus_j3 = (two_j1 + two_j2 - two_j3) / 2;
    let j1_minus_m1 = (two_j1 - two_m1) / 2;
    let j2_plus_m2 = (two_j2 + two_m2) / 2;
    let j3_minus_j2_plus_m1 = (two_j3 - two_j2 + two_m1) / 2;
    let j3_minus_j1_minus_m2 = (two_j3 - two_j1 - two_m2) / 2;

    let t_min = 0.max(-j3_minus_j2_plus_m1).max(-j3_minus_j1_minus_m2);
    let t_max = j1_plus_j2_minus_j3.min(j1_minus_m1).min(j2_plus_m2);
    if t_min > t_max {
        return 0.0;
    }

    let ln_prefactor = 0.5
        * (ln_triangle_coefficient(two_j1, two_j2, two_j3)
            + ln_factorial((two_j1 + two_m1) / 2)
            + ln_factorial((two_j1 - two_m1) / 2)
            + ln_factorial((two_j2 + two_m2) / 2)
            + ln_factorial((two_j2 - two_m2) / 2)
            + ln_factorial((two_j3 + two_m3) / 2)
            + ln_factorial((two_j3 - two_m3) / 2));

    let mut sum = 0.0;
    for t in t_min..=t_max {
        let ln_denominator = ln_factorial(t)
            + ln_factorial(j3_minus_j2_plus_m1 + t)
            + ln_factorial(j3_minus_j1_minus_m2 + t)
            + ln_factorial(j1_plus_j2_minus_j3 - t)
            + ln_factorial(j1_minus_m1 - t)
            + ln_factorial(j2_plus_m2 - t);
        sum += sign_of_power(t) * (ln_prefactor - ln_denominator).exp();
    }

    sign_of_power((two_j1 - two_j2 - two_m3) / 2) * sum
}

// ln Δ(abc) = ln[(a+b-c)!(a-b+c)!(-a+b+c)!/(a+b+c+1)!]
fn ln_triangle_coefficient(two_a: i32, two_b: i32, two_c: i32) -> f64 {
    ln_factorial((two_a + two_b - two_c) / 2)
        + ln_factorial((two_a - two_b + two_c) / 2)
        + ln_factorial((-two_a + two_b + two_c) / 2)
        - ln_factorial((two_a + two_b + two_c) / 2 + 1)
}

/// Wigner 6j symbol `{j1 j2 j3; j4 j5 j6}` from the Racah sum.
pub fn wigner_6j(input: Wigner6jInput) -> f64 {
    let Wigner6jInput {
        two_j1,
        two_j2,
        two_j3,
        two_j4,
        two_j5,
        two_j6,
    } = input;

    let triads = [
        (two_j1, two_j2, two_j3),
        (two_j1, two_j5, two_j6),
        (two_j4, two_j2, two_j6),
        (two_j4, two_j5, two_j3),
    ];
    if triads.iter().any(|&(a, b, c)| !triangle(a, b, c)) {
        return 0.0;
    }

    let lower = triads.map(|(a, b, c)| (a + b + c) / 2);
    let upper = [
        (two_j1 + two_j2 + two_j4 + two_j5) / 2,
        (two_j2 + two_j3 + two_j5 + two_j6) / 2,
        (two_j3 + two_j1 + two_j6 + two_j4) / 2,
    ];
    let t_min = lower.iter().copied().max().unwrap_or(0);
    let t_max = upper.iter().copied().min().unwrap_or(-1);
    if t_min > t_max {
        return 0.0;
    }

    let ln_prefactor: f64 = 0.5
        * triads
            .iter()
            .map(|&(a, b, c)| ln_triangle_coefficient(a, b, c))
            .sum::<f64>();

    let mut sum = 0.0;
    for t in t_min..=t_max {
        let ln_denominator: f64 = lower.iter().map(|a| ln_factorial(t - a)).sum::<f64>()
            + upper.iter().map(|b| ln_factorial(b - t)).sum::<f64>();
        sum += sign_of_power(t) * (ln_prefactor + ln_factorial(t + 1) - ln_denominator).exp();
    }
    sum
}

/// Orbital angular momentum `l` of a relativistic `kappa`.
pub fn l_of_kappa(kappa: i32) -> i32 {
    if kappa > 0 { kappa } else { -kappa - 1 }
}

/// Doubled total angular momentum `2j` of a relativistic `kappa`.
pub fn twoj_of_kappa(kappa: i32) -> i32 {
    2 * kappa.abs() - 1
}

fn parity_allowed(la: i32, lb: i32, k: i32) -> bool {
    (la + lb + k) % 2 == 0
}

/// Reduced matrix element `<kappa_a||C^k||kappa_b>` of the normalised spherical tensor.
pub fn reduced_ck(k: i32, kappa_a: i32, kappa_b: i32) -> f64 {
    let (la, lb) = (l_of_kappa(kappa_a), l_of_kappa(kappa_b));
    if k < 0 || !parity_allowed(la, lb, k) {
        return 0.0;
    }
    let (two_ja, two_jb) = (twoj_of_kappa(kappa_a), twoj_of_kappa(kappa_b));
    let three_j = wigner_3j(Wigner3jInput::new(two_ja, two_jb, 2 * k, -1, 1, 0));
    let phase = sign_of_power((two_ja + 1) / 2);
    phase * f64::from((two_ja + 1) * (two_jb + 1)).sqrt() * three_j
}

/// Exchange angular factor `Λ^k_ab = (ja jb k; -1/2 1/2 0)^2` with the parity selection rule.
pub fn lambda_k(k: i32, kappa_a: i32, kappa_b: i32) -> f64 {
    let (la, lb) = (l_of_kappa(kappa_a), l_of_kappa(kappa_b));
    if k < 0 || !parity_allowed(la, lb, k) {
        return 0.0;
    }
    let three_j = wigner_3j(Wigner3jInput::new(
        twoj_of_kappa(kappa_a),
        twoj_of_kappa(kappa_b),
        2 * k,
        -1,
        1,
        0,
    ));
    three_j * three_j
}

#[cfg(test)]
mod tests {
    use super::{
        LOG_FACTORIAL_DIM, Wigner3jInput, Wigner6jInput, lambda_k, ln_factorial, reduced_ck,
        triangle, wigner_3j, wigner_6j,
    };
    use std::f64::consts::FRAC_1_SQRT_2;

    #[test]
    fn wigner_3j_returns_zero_for_selection_rule_violations() {
        let cases = [
            Wigner3jInput::new(2, 2, 0, 0, 0, 2),
            Wigner3jInput::new(2, 2, 8, 0, 0, 0),
            Wigner3jInput::new(2, 2, 0, 4, -4, 0),
            Wigner3jInput::new(1, 1, 1, 1, -1, 0),
            Wigner3jInput::new(2, 2, 2, 1, -1, 0),
        ];
        for input in cases {
            let actual = wigner_3j(input);
            assert!(actual.abs() <= 1.0e-15, "{input:?} gave {actual:e}");
        }
    }

    #[test]
    fn wigner_3j_matches_tabulated_reference_values() {
        let cases = [
            ("(0,0,0;0,0,0)", Wigner3jInput::new(0, 0, 0, 0, 0, 0), 1.0),
            (
                "(1,1,0;0,0,0)",
                Wigner3jInput::new(2, 2, 0, 0, 0, 0),
                -1.0 / 3.0_f64.sqrt(),
            ),
            (
                "(1,1,2;0,0,0)",
                Wigner3jInput::new(2, 2, 4, 0, 0, 0),
                (2.0_f64 / 15.0).sqrt(),
            ),
            (
                "(1/2,1/2,0;1/2,-1/2,0)",
                Wigner3jInput::new(1, 1, 0, 1, -1, 0),
                FRAC_1_SQRT_2,
            ),
            (
                "(1/2,1/2,1;1/2,1/2,-1)",
                Wigner3jInput::new(1, 1, 2, 1, 1, -2),
                -1.0 / 3.0_f64.sqrt(),
            ),
            (
                "(3/2,1,1/2;1/2,0,-1/2)",
                Wigner3jInput::new(3, 2, 1, 1, 0, -1),
                1.0 / 6.0_f64.sqrt(),
            ),
            (
                "(3/2,1,1/2;-1/2,0,1/2)",
                Wigner3jInput::new(3, 2, 1, -1, 0, 1),
                -1.0 / 6.0_f64.sqrt(),
            ),
        ];
        for (label, input, expected) in cases {
            assert_scalar_close(label, expected, wigner_3j(input), 1.0e-14, 1.0e-13);
        }
    }

    #[test]
    fn wigner_6j_matches_closed_forms() {
        // {a b c; 0 c b} = (-1)^(a+b+c) / sqrt((2b+1)(2c+1))
        let cases = [
            ("{1 1 1;0 1 1}", Wigner6jInput::new(2, 2, 2, 0, 2, 2), -1.0 / 3.0),
            (
                "{1/2 1/2 1;0 1 1/2}",
                Wigner6jInput::new(1, 1, 2, 0, 2, 1),
                1.0 / 6.0_f64.sqrt(),
            ),
            ("{1 1 1;1 1 1}", Wigner6jInput::new(2, 2, 2, 2, 2, 2), 1.0 / 6.0),
            ("{1/2 1/2 1;1/2 1/2 1}", Wigner6jInput::new(1, 1, 2, 1, 1, 2), 1.0 / 6.0),
            ("{1/2 1/2 0;1/2 1/2 1}", Wigner6jInput::new(1, 1, 0, 1, 1, 2), 0.5),
        ];
        for (label, input, expected) in cases {
            assert_scalar_close(label, expected, wigner_6j(input), 1.0e-14, 1.0e-13);
        }
        assert_eq!(wigner_6j(Wigner6jInput::new(2, 2, 8, 2, 2, 2)), 0.0);
    }

    #[test]
    fn six_j_canonical_form_is_shared_by_symmetric_arguments() {
        let base = Wigner6jInput::new(3, 5, 4, 3, 3, 2);
        let swapped_columns = Wigner6jInput::new(5, 3, 4, 3, 3, 2);
        let flipped_pair = Wigner6jInput::new(3, 3, 4, 3, 5, 2);
        assert_eq!(base.canonical(), swapped_columns.canonical());
        assert_eq!(base.canonical(), flipped_pair.canonical());
        assert!(wigner_6j(base).abs() > 1.0e-3);
        assert_scalar_close(
            "symmetric 6j",
            wigner_6j(base),
            wigner_6j(flipped_pair),
            1.0e-14,
            1.0e-13,
        );
    }

    #[test]
    fn lambda_and_ck_follow_known_values() {
        // s1/2 - s1/2, k = 0
        assert_scalar_close("L0 ss", 0.5, lambda_k(0, -1, -1), 1.0e-15, 1.0e-14);
        assert_eq!(lambda_k(1, -1, -1), 0.0);
        // s1/2 - p3/2 and s1/2 - p1/2, k = 1
        assert_scalar_close("L1 s p3", 1.0 / 6.0, lambda_k(1, -1, -2), 1.0e-15, 1.0e-14);
        assert_scalar_close("L1 s p1", 1.0 / 6.0, lambda_k(1, -1, 1), 1.0e-15, 1.0e-14);
        // <s1/2||C^0||s1/2> = sqrt(2j+1)
        assert_scalar_close("C0 ss", 2.0_f64.sqrt(), reduced_ck(0, -1, -1), 1.0e-14, 1.0e-13);
        assert_eq!(reduced_ck(1, -1, -1), 0.0);
        assert!(triangle(1, 1, 0));
        assert!(!triangle(1, 1, 1));
    }

    fn assert_scalar_close(label: &str, expected: f64, actual: f64, abs_tol: f64, rel_tol: f64) {
        let abs_diff = (actual - expected).abs();
        let rel_diff = abs_diff / expected.abs().max(1.0);
        assert!(
            abs_diff <= abs_tol || rel_diff <= rel_tol,
            "{label} expected={expected:.15e} actual={actual:.15e} abs_diff={abs_diff:.15e}",
        );
    }

    #[test]
    fn log_factorial_table_matches_direct_sums_on_both_sides_of_its_end() {
        let direct = |n: i32| (2..=n).map(|k| f64::from(k).ln()).sum::<f64>();
        assert_eq!(ln_factorial(0), 0.0);
        assert_eq!(ln_factorial(1), 0.0);
        assert!((ln_factorial(5) - 120.0_f64.ln()).abs() <= 1.0e-12);
        let end = LOG_FACTORIAL_DIM as i32;
        for n in [end - 1, end, end + 7] {
            let expected = direct(n);
            assert!((ln_factorial(n) - expected).abs() <= 1.0e-9 * expected, "ln {n}!");
        }
    }
}
