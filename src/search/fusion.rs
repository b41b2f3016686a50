//! Weighted three-signal fusion.
use crate::config::FusionWeights;

/// Clamp a raw score into `[0, 1]` given an assumed ceiling.
pub fn normalize(score: f64, ceiling: f64) -> f64 {
    if ceiling <= 0.0 || !score.is_finite() {
        return 0.0;
    }
    (score / ceiling).clamp(0.0, 1.0)
}

/// Per-signal inputs for one candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Signals {
    /// Raw BM25 score.
    pub lexical: f64,
    /// Cosine similarity, 0 when there was no vector hit.
    pub vector: f64,
    /// Summed symbol weights.
    pub structural: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct Fusion {
    pub weights: FusionWeights,
    pub lexical_ceiling: f64,
}

impl Fusion {
    pub fn new(weights: FusionWeights, lexical_ceiling: f64) -> Self {
        Self {
            weights,
            lexical_ceiling,
        }
    }

    pub fn lexical_normalized(&self, signals: &Signals) -> f64 {
        normalize(signals.lexical, self.lexical_ceiling)
    }

    /// `w_lex * norm(lexical) + w_vec * vector + w_struct * structural`.
    pub fn fuse(&self, signals: &Signals) -> f64 {
        self.weights.lexical * self.lexical_normalized(signals)
            + self.weights.vector * signals.vector.max(0.0)
            + self.weights.structural * signals.structural.max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fusion() -> Fusion {
        Fusion::new(FusionWeights::default(), 10.0)
    }

    #[test]
    fn test_normalize_clamps() {
        assert_eq!(normalize(5.0, 10.0), 0.5);
        assert_eq!(normalize(25.0, 10.0), 1.0);
        assert_eq!(normalize(-1.0, 10.0), 0.0);
        assert_eq!(normalize(3.0, 0.0), 0.0);
    }

    #[test]
    fn test_reference_weights() {
        let s = Signals {
            lexical: 5.0,
            vector: 0.5,
            structural: 1.0,
        };
        let expected = 0.3 * 0.5 + 0.4 * 0.5 + 0.3 * 1.0;
        assert!((fusion().fuse(&s) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_monotonic_in_each_signal() {
        let f = fusion();
        let base = Signals {
            lexical: 2.0,
            vector: 0.3,
            structural: 0.5,
        };
        let steps = [0.0, 0.1, 0.5, 1.0, 4.0, 20.0];
        let mut prev = (f64::MIN, f64::MIN, f64::MIN);
        for &step in &steps {
            let lex = f.fuse(&Signals {
                lexical: base.lexical + step,
                ..base
            });
            let vec = f.fuse(&Signals {
                vector: base.vector + step,
                ..base
            });
            let st = f.fuse(&Signals {
                structural: base.structural + step,
                ..base
            });
            assert!(lex >= prev.0 && vec >= prev.1 && st >= prev.2);
            prev = (lex, vec, st);
        }
    }
}
