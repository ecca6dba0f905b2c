//! Response interpretation: map a raw engine result onto [`SolveOutcome`].

use crate::engine::EngineSolution;
use crate::model::SolveOutcome;

/// Turn an engine result into the two-state response contract.
///
/// `None` and an empty solution both become [`SolveOutcome::NoMatch`]. For a
/// positive result only the best-ranked match is surfaced. Pure; never fails.
pub fn interpret(solution: Option<&EngineSolution>) -> SolveOutcome {
    match solution.and_then(EngineSolution::best_match) {
        None => SolveOutcome::NoMatch,
        Some(best) => SolveOutcome::Match {
            center_ra_deg: best.center_ra_deg,
            center_dec_deg: best.center_dec_deg,
            scale_arcsec_per_pixel: best.scale_arcsec_per_pixel,
            wcs_header: best.wcs.to_header(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineMatch;
    use crate::test_utils::sample_match;
    use crate::wcs::Wcs;

    #[test]
    fn absent_solution_is_no_match() {
        assert_eq!(interpret(None), SolveOutcome::NoMatch);
    }

    #[test]
    fn empty_solution_is_no_match() {
        assert_eq!(
            interpret(Some(&EngineSolution::default())),
            SolveOutcome::NoMatch
        );
    }

    #[test]
    fn only_the_best_match_is_surfaced() {
        let solution = EngineSolution {
            matches: vec![sample_match(180.0, -15.0, 1.23), sample_match(10.0, 10.0, 4.0)],
        };

        match interpret(Some(&solution)) {
            SolveOutcome::Match {
                center_ra_deg,
                center_dec_deg,
                scale_arcsec_per_pixel,
                ..
            } => {
                assert_eq!(center_ra_deg, 180.0);
                assert_eq!(center_dec_deg, -15.0);
                assert_eq!(scale_arcsec_per_pixel, 1.23);
            }
            SolveOutcome::NoMatch => panic!("expected a match"),
        }
    }

    #[test]
    fn header_rebuilds_the_fitted_transform() {
        let best: EngineMatch = sample_match(83.8, -5.4, 2.5);
        let outcome = interpret(Some(&EngineSolution::single(best.clone())));

        let SolveOutcome::Match { wcs_header, .. } = outcome else {
            panic!("expected a match");
        };
        let rebuilt = Wcs::from_header(&wcs_header).unwrap();

        assert_eq!(rebuilt, best.wcs);
        let (ra, dec) = rebuilt.pixel_to_sky(10.0, 1000.0);
        let (ra0, dec0) = best.wcs.pixel_to_sky(10.0, 1000.0);
        assert!((ra - ra0).abs() < 1e-12 && (dec - dec0).abs() < 1e-12);
    }
}
