/*!
# Saving Sampled Networks and Learning Curves to CSV

Enable via the `csv` feature.
*/

use std::fs::File;

use csv::Writer;

use crate::bohamiann::{LearningCurve, WeightSnapshot};
use crate::error::{BnnError, Result};

/**
Saves a collection of weight snapshots as a CSV file.

The resulting CSV file has:
- A header row containing `"sample"` followed by one column per scalar parameter, named
  `"p{slot}_{row}_{col}"` after the parameter slot and the position inside it.
- One row per snapshot, in capture order.

All snapshots must have the same layout as the first one, otherwise
[`BnnError::ShapeMismatch`] is returned.

# Examples

```rust
use ndarray::array;
use sgmcmc_bnn::io::csv::save_snapshots_csv;

let snapshots = vec![
    vec![array![[1.0, 2.0]], array![[0.5]]],
    vec![array![[1.5, 2.5]], array![[0.25]]],
];
save_snapshots_csv(&snapshots, "/tmp/snapshots.csv")?;
# Ok::<(), sgmcmc_bnn::error::BnnError>(())
```
*/
pub fn save_snapshots_csv(snapshots: &[WeightSnapshot], filename: &str) -> Result<()> {
    let mut wtr = Writer::from_writer(File::create(filename)?);

    let layout: Vec<(usize, usize)> = snapshots
        .first()
        .map(|snapshot| snapshot.iter().map(|p| p.dim()).collect())
        .unwrap_or_default();

    let mut header = vec!["sample".to_string()];
    for (slot, &(rows, cols)) in layout.iter().enumerate() {
        for row in 0..rows {
            header.extend((0..cols).map(|col| format!("p{slot}_{row}_{col}")));
        }
    }
    wtr.write_record(&header)?;

    for (sample, snapshot) in snapshots.iter().enumerate() {
        let snapshot_layout: Vec<(usize, usize)> = snapshot.iter().map(|p| p.dim()).collect();
        if snapshot_layout != layout {
            return Err(BnnError::ShapeMismatch {
                expected: layout.iter().flat_map(|&(r, c)| [r, c]).collect(),
                got: snapshot_layout.iter().flat_map(|&(r, c)| [r, c]).collect(),
            });
        }
        let mut row = vec![sample.to_string()];
        row.extend(snapshot.iter().flatten().map(|v| v.to_string()));
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Saves a [`LearningCurve`] with columns `step`, `log_likelihood` and `mse`.
pub fn save_learning_curve_csv(curve: &LearningCurve, filename: &str) -> Result<()> {
    let mut wtr = Writer::from_writer(File::create(filename)?);
    wtr.write_record(["step", "log_likelihood", "mse"])?;
    for ((step, ll), mse) in curve
        .steps
        .iter()
        .zip(&curve.log_likelihoods)
        .zip(&curve.mse)
    {
        wtr.write_record([step.to_string(), ll.to_string(), mse.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::fs;
    use tempfile::NamedTempFile;

    /// No snapshots still produce a header.
    #[test]
    fn test_save_snapshots_csv_empty() {
        let file = NamedTempFile::new().expect("Could not create temp file");
        let filename = file.path().to_str().unwrap();

        let result = save_snapshots_csv(&[], filename);
        assert!(result.is_ok(), "Saving no snapshots failed: {:?}", result);
        assert_eq!(fs::read_to_string(filename).unwrap().trim(), "sample");
    }

    #[test]
    fn test_save_snapshots_csv_layout() {
        let snapshots = vec![
            vec![array![[1.0, 2.0], [3.0, 4.0]], array![[5.0]]],
            vec![array![[10.0, 20.0], [30.0, 40.0]], array![[50.0]]],
        ];
        let file = NamedTempFile::new().expect("Could not create temp file");
        let filename = file.path().to_str().unwrap();

        save_snapshots_csv(&snapshots, filename).unwrap();
        let contents = fs::read_to_string(filename).unwrap();
        let expected = "\
sample,p0_0_0,p0_0_1,p0_1_0,p0_1_1,p1_0_0
0,1,2,3,4,5
1,10,20,30,40,50";
        assert_eq!(contents.trim(), expected);
    }

    #[test]
    fn test_save_snapshots_csv_inconsistent_layout() {
        let snapshots = vec![vec![array![[1.0, 2.0]]], vec![array![[1.0], [2.0]]]];
        let file = NamedTempFile::new().expect("Could not create temp file");
        let filename = file.path().to_str().unwrap();

        let err = save_snapshots_csv(&snapshots, filename).unwrap_err();
        assert!(matches!(err, BnnError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_save_learning_curve_csv() {
        let curve = LearningCurve {
            steps: vec![10, 20],
            log_likelihoods: vec![-1.5, -0.25],
            mse: vec![0.5, 0.125],
        };
        let file = NamedTempFile::new().expect("Could not create temp file");
        let filename = file.path().to_str().unwrap();

        save_learning_curve_csv(&curve, filename).unwrap();
        let contents = fs::read_to_string(filename).unwrap();
        assert_eq!(
            contents.trim(),
            "step,log_likelihood,mse\n10,-1.5,0.5\n20,-0.25,0.125"
        );
    }
}
