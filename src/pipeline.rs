use std::path::PathBuf;
use tracing::info;

use crate::config::Settings;
use crate::error::Result;
use crate::render::{render, Legend, ScatterPlot};
use crate::store::{fetch_dataset, ScrollRequest, VectorStore};
use crate::tsne::TsneReducer;

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub fetched: usize,
    pub dimensions: usize,
    pub output_path: PathBuf,
    pub has_variance: bool,
}

/// A laid-out figure plus the shape of the data behind it.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub plot: ScatterPlot,
    pub fetched: usize,
    pub dimensions: usize,
}

/// Fetch, project and lay out the figure without drawing it.
pub fn prepare<S: VectorStore + ?Sized>(store: &mut S, settings: &Settings) -> Result<Prepared> {
    info!(
        "Fetching up to {} vectors from collection '{}'",
        settings.store.fetch_limit, settings.store.collection_name
    );
    let dataset = fetch_dataset(store, &ScrollRequest::from_settings(&settings.store))?;

    let reducer = TsneReducer::new(&settings.reducer);
    reducer.check_sample_count(dataset.len())?;

    info!(
        "Reducing {} vectors of dimension {} to 2D",
        dataset.len(),
        dataset.dimensions()
    );
    let projected = reducer.project(&dataset)?;

    info!("Building scatter plot");
    let plot = ScatterPlot::build(&projected, &settings.render)?;
    Ok(Prepared {
        plot,
        fetched: dataset.len(),
        dimensions: dataset.dimensions(),
    })
}

/// Runs Fetcher, Reducer and Renderer once each, in that order.
pub fn run<S: VectorStore + ?Sized>(store: &mut S, settings: &Settings) -> Result<PipelineReport> {
    let Prepared {
        plot,
        fetched,
        dimensions,
    } = prepare(store, settings)?;
    render(&plot, &settings.render)?;

    Ok(PipelineReport {
        fetched,
        dimensions,
        output_path: settings.render.output_path.clone(),
        has_variance: matches!(plot.legend, Legend::Gradient { .. }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VecplotConfig;
    use crate::error::PipelineError;
    use crate::store::tests::MemoryStore;
    use crate::store::{AttributeValue, StoredPoint};

    fn settings(limit: usize) -> Settings {
        Settings::resolve(VecplotConfig {
            fetch_limit: Some(limit),
            neighborhood_size: Some(5.0),
            max_iterations: Some(50),
            ..Default::default()
        })
        .unwrap()
    }

    fn store(n: usize) -> MemoryStore {
        MemoryStore {
            points: (0..n)
                .map(|i| StoredPoint {
                    id: i.to_string(),
                    vector: Some(vec![i as f32, (i * i) as f32 * 0.1, 1.0]),
                    attribute: AttributeValue::Number(i as f64),
                })
                .collect(),
            calls: 0,
        }
    }

    #[test]
    fn zero_limit_fails_before_reduction() {
        let mut store = store(20);
        match prepare(&mut store, &settings(0)) {
            Err(PipelineError::InsufficientData { found, .. }) => assert_eq!(found, 0),
            other => panic!("expected insufficient data, got {:?}", other.map(|p| p.fetched)),
        }
        assert_eq!(store.calls, 0);
    }

    #[test]
    fn empty_collection_is_insufficient_data() {
        let mut store = store(0);
        assert!(matches!(
            prepare(&mut store, &settings(100)),
            Err(PipelineError::InsufficientData { found: 0, required: 6 })
        ));
    }

    #[test]
    fn fewer_samples_than_perplexity_is_insufficient_data() {
        let mut store = store(5);
        assert!(matches!(
            prepare(&mut store, &settings(100)),
            Err(PipelineError::InsufficientData { found: 5, required: 6 })
        ));
    }

    #[test]
    fn prepares_one_point_per_record() {
        let mut store = store(12);
        let prepared = prepare(&mut store, &settings(100)).unwrap();
        assert_eq!(prepared.fetched, 12);
        assert_eq!(prepared.dimensions, 3);
        assert_eq!(prepared.plot.points.len(), 12);
        assert!(matches!(prepared.plot.legend, Legend::Gradient { .. }));
    }
}
