//! Extracted spectrum
//!
//! One flux value per wavelength slice, paired positionally with the
//! wavelength vector. Degenerate slices carry a NaN flux value.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// 1D extracted spectrum
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Spectrum {
    pub wavelength: Vec<f64>,
    pub flux: Vec<f64>,
}
impl Spectrum {
    pub fn len(&self) -> usize {
        self.flux.len()
    }
    pub fn is_empty(&self) -> bool {
        self.flux.is_empty()
    }
    /// Iterator over `(wavelength, flux)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.wavelength
            .iter()
            .zip(self.flux.iter())
            .map(|(&w, &f)| (w, f))
    }
    /// Number of slices that came out degenerate
    pub fn nan_slices(&self) -> usize {
        self.flux.iter().filter(|f| f.is_nan()).count()
    }
    /// Prints the spectrum statistics
    pub fn summary(&self) {
        let max_value = |x: &[f64]| x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min_value = |x: &[f64]| x.iter().cloned().fold(f64::INFINITY, f64::min);
        let stats = |x: &[f64]| {
            let n = x.len() as f64;
            let mean = x.iter().sum::<f64>() / n;
            let std = (x.iter().map(|x| x - mean).fold(0f64, |s, x| s + x * x) / n).sqrt();
            (mean, std)
        };

        println!("SUMMARY:");
        println!(" - # of slices: {}", self.len());
        if self.is_empty() {
            return;
        }
        println!(
            " - wavelength range: [{:8.4}-{:8.4}]",
            self.wavelength[0],
            self.wavelength.last().unwrap()
        );
        let finite: Vec<f64> = self.flux.iter().cloned().filter(|f| f.is_finite()).collect();
        println!(" - # of degenerate slices: {}", self.nan_slices());
        if !finite.is_empty() {
            println!(
                " - flux: ({:^12}, {:^12})  ({:^12}, {:^12})",
                "MEAN", "STD", "MIN", "MAX"
            );
            println!(
                "         {:>12.3?}  {:>12.3?}",
                stats(&finite),
                (min_value(&finite), max_value(&finite))
            );
        }
    }
    /// Saves the spectrum to a two-column CSV file
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(["Wavelength", "Flux"])?;
        for (wavelength, flux) in self.iter() {
            wtr.write_record(&[wavelength.to_string(), flux.to_string()])?;
        }
        wtr.flush()?;
        Ok(())
    }
    /// Plots the spectrum to an SVG file
    #[cfg(feature = "plot")]
    pub fn plot<P: AsRef<Path>>(&self, path: P) {
        use plotters::prelude::*;

        let finite: Vec<(f64, f64)> = self.iter().filter(|(_, f)| f.is_finite()).collect();
        if finite.is_empty() {
            return;
        }
        let plot = SVGBackend::new(path.as_ref(), (768, 512)).into_drawing_area();
        plot.fill(&WHITE).unwrap();

        let (flux_min, flux_max) = finite
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, f)| {
                (lo.min(f), hi.max(f))
            });
        let mut chart = ChartBuilder::on(&plot)
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .margin(10)
            .build_cartesian_2d(
                self.wavelength[0]..*self.wavelength.last().unwrap(),
                flux_min..flux_max,
            )
            .unwrap();
        chart
            .configure_mesh()
            .x_desc("Wavelength")
            .y_desc("Flux")
            .draw()
            .unwrap();
        chart
            .draw_series(LineSeries::new(finite, &BLUE))
            .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Spectrum {
        Spectrum {
            wavelength: vec![1f64, 1.1, 1.2, 1.3],
            flux: vec![2f64, 2.5, f64::NAN, 3f64],
        }
    }

    #[test]
    fn nan_slices_are_counted() {
        assert_eq!(sample().nan_slices(), 1);
        assert_eq!(sample().len(), 4);
    }

    #[test]
    fn summary_handles_nan_entries() {
        sample().summary();
        Spectrum::default().summary();
    }

    #[test]
    fn csv_round_trip() {
        let spectrum = sample();
        let path = std::env::temp_dir().join("ifu-optex_spectrum_test.csv");
        spectrum.to_csv(&path).unwrap();
        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<(f64, f64)> = rdr
            .records()
            .map(|record| {
                let record = record.unwrap();
                (
                    record[0].parse::<f64>().unwrap(),
                    record[1].parse::<f64>().unwrap(),
                )
            })
            .collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1], (1.1, 2.5));
        assert!(rows[2].1.is_nan());
        std::fs::remove_file(path).ok();
    }
}
