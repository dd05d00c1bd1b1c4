//! Time-series output collection
//!
//! Calculations record per-step values and per-node summaries while the run
//! progresses. When the orchestrator ends the simulation the collected values
//! are turned into [`DataPoint`]s and handed to a [`TimeSeriesSink`].

use crate::simulation::Simulation;
use async_trait::async_trait;
use dots_core::{DotsError, DotsResult, NodeId};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Timestamp format of data points
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// One point of a measurement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint {
    /// Measurement name
    pub measurement: String,
    /// Tags identifying the series
    pub tags: BTreeMap<String, String>,
    /// UTC timestamp in [`TIMESTAMP_FORMAT`]
    pub time: String,
    /// Field values
    pub fields: BTreeMap<String, f64>,
}

#[derive(Debug, Clone)]
struct OutputLayout {
    simulation_id: String,
    model_id: String,
    measurement: String,
    step_times: Vec<String>,
    names: IndexMap<NodeId, String>,
}

/// Collector for per-step and summary outputs of owned nodes
#[derive(Debug, Clone, Default)]
pub struct TimeSeriesOutput {
    layout: Option<OutputLayout>,
    profiles: IndexMap<NodeId, IndexMap<String, Vec<f64>>>,
    summaries: IndexMap<NodeId, IndexMap<String, f64>>,
}

impl TimeSeriesOutput {
    /// Create an empty collector; nothing is written until initialised
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether [`init_profile_output`](Self::init_profile_output) ran
    pub fn is_initialized(&self) -> bool {
        self.layout.is_some()
    }

    /// Preallocate one zeroed series per node and output name
    pub fn init_profile_output(
        &mut self,
        simulation: &Simulation,
        measurement: impl Into<String>,
        node_ids: &[NodeId],
        output_names: &[&str],
    ) {
        let measurement = measurement.into();
        let nr_of_time_steps = usize::try_from(simulation.nr_of_time_steps()).unwrap_or(0);

        let mut names = IndexMap::new();
        for node_id in node_ids {
            let name = simulation
                .graph()
                .node(node_id.as_str())
                .and_then(|node| node.name())
                .map_or_else(|| measurement.clone(), str::to_string);
            names.insert(node_id.clone(), name);

            let series = output_names
                .iter()
                .map(|output| (output.to_string(), vec![0.0; nr_of_time_steps]))
                .collect();
            self.profiles.insert(node_id.clone(), series);
            self.summaries.insert(node_id.clone(), IndexMap::new());
        }

        self.layout = Some(OutputLayout {
            simulation_id: simulation.simulation_id().to_string(),
            model_id: simulation.model_id().to_string(),
            measurement,
            step_times: step_times(simulation),
            names,
        });
    }

    /// Set the value of a series for a 1-based step number
    ///
    /// NaN is stored as 0.0.
    pub fn set_time_step_data_point(
        &mut self,
        node_id: &NodeId,
        output_name: &str,
        time_step_nr: u64,
        mut value: f64,
    ) -> DotsResult<()> {
        let series = self
            .profiles
            .get_mut(node_id)
            .and_then(|outputs| outputs.get_mut(output_name))
            .ok_or_else(|| {
                DotsError::protocol(format!(
                    "No output series '{output_name}' for node '{node_id}'"
                ))
            })?;

        let index = usize::try_from(time_step_nr)
            .ok()
            .and_then(|nr| nr.checked_sub(1))
            .filter(|index| *index < series.len())
            .ok_or_else(|| {
                DotsError::protocol(format!(
                    "Time step {time_step_nr} is outside the simulation (1..={})",
                    series.len()
                ))
            })?;

        if value.is_nan() {
            warn!(output_name, "Value is NaN, changing to 0.0");
            value = 0.0;
        }
        series[index] = value;
        Ok(())
    }

    /// Set a summary value for a node
    pub fn set_summary_data_point(
        &mut self,
        node_id: &NodeId,
        output_name: &str,
        value: f64,
    ) -> DotsResult<()> {
        let summary = self.summaries.get_mut(node_id).ok_or_else(|| {
            DotsError::protocol(format!("No output initialised for node '{node_id}'"))
        })?;
        summary.insert(output_name.to_string(), value);
        Ok(())
    }

    /// Value of a series at a 1-based step number
    pub fn time_step_value(
        &self,
        node_id: &NodeId,
        output_name: &str,
        time_step_nr: u64,
    ) -> Option<f64> {
        let index = usize::try_from(time_step_nr).ok()?.checked_sub(1)?;
        self.profiles.get(node_id)?.get(output_name)?.get(index).copied()
    }

    /// Convert collected values into data points
    ///
    /// Step `i` (0-based) is stamped `start + (i + 2) * step`. Summary points
    /// use the first step's timestamp.
    pub fn to_points(&self) -> Vec<DataPoint> {
        let Some(layout) = self.layout.as_ref() else {
            return Vec::new();
        };

        let mut points = Vec::new();
        for (step_index, time) in layout.step_times.iter().enumerate() {
            for (node_id, outputs) in &self.profiles {
                let fields = outputs
                    .iter()
                    .map(|(name, series)| {
                        let value = series.get(step_index).copied().unwrap_or(0.0);
                        (name.clone(), value)
                    })
                    .collect();
                points.push(layout.point(node_id, time, fields));
            }
        }

        if let Some(first) = layout.step_times.first() {
            for (node_id, summary) in &self.summaries {
                if summary.is_empty() {
                    continue;
                }
                let fields = summary
                    .iter()
                    .map(|(name, value)| (name.clone(), *value))
                    .collect();
                points.push(layout.point(node_id, first, fields));
            }
        }

        info!(
            points = points.len(),
            measurement = %layout.measurement,
            simulation_id = %layout.simulation_id,
            "Prepared time-series points"
        );
        points
    }
}

impl OutputLayout {
    fn point(&self, node_id: &NodeId, time: &str, fields: BTreeMap<String, f64>) -> DataPoint {
        let name = self
            .names
            .get(node_id)
            .cloned()
            .unwrap_or_else(|| self.measurement.clone());
        let tags = BTreeMap::from([
            ("simulation_id".to_string(), self.simulation_id.clone()),
            ("model_id".to_string(), self.model_id.clone()),
            ("esdl_id".to_string(), node_id.to_string()),
            ("esdl_name".to_string(), name),
        ]);
        DataPoint {
            measurement: self.measurement.clone(),
            tags,
            time: time.to_string(),
            fields,
        }
    }
}

fn step_times(simulation: &Simulation) -> Vec<String> {
    (0..simulation.nr_of_time_steps())
        .map(|step_index| {
            simulation
                .time_after_steps(step_index + 2)
                .format(TIMESTAMP_FORMAT)
                .to_string()
        })
        .collect()
}

/// Destination for collected time-series points
#[async_trait]
pub trait TimeSeriesSink: Send + Sync {
    /// Write a batch of points
    async fn write(&self, points: Vec<DataPoint>) -> DotsResult<()>;
}

/// Sink that discards all points
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTimeSeriesSink;

#[async_trait]
impl TimeSeriesSink for NullTimeSeriesSink {
    async fn write(&self, _points: Vec<DataPoint>) -> DotsResult<()> {
        Ok(())
    }
}

/// Sink keeping points in memory
#[derive(Debug, Default)]
pub struct MemoryTimeSeriesSink {
    points: Mutex<Vec<DataPoint>>,
}

impl MemoryTimeSeriesSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Points written so far
    pub fn points(&self) -> Vec<DataPoint> {
        self.points.lock().clone()
    }
}

#[async_trait]
impl TimeSeriesSink for MemoryTimeSeriesSink {
    async fn write(&self, points: Vec<DataPoint>) -> DotsResult<()> {
        self.points.lock().extend(points);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use dots_core::{ModelParameters, TopicScheme};
    use dots_topology::NodeDocument;

    fn simulation() -> Simulation {
        let doc = NodeDocument::new("es", "EnergySystem")
            .with_child(NodeDocument::asset("hp", "HeatPump", vec![]).with_name("Heat pump"))
            .with_child(NodeDocument::asset("pv", "PVInstallation", vec![]));
        let parameters = ModelParameters {
            simulation_name: "run".to_string(),
            // 2024-01-01T00:00:00Z
            start_timestamp: 1_704_067_200.0,
            time_step_seconds: 900,
            nr_of_time_steps: 3,
            owned_node_ids: vec![NodeId::from("hp"), NodeId::from("pv")],
            calculation_services: vec![],
            base64_graph: dots_topology::encode(&doc).unwrap(),
        };
        Simulation::from_parameters(&TopicScheme::new("sim", "model"), &parameters, vec![]).unwrap()
    }

    fn output() -> TimeSeriesOutput {
        let simulation = simulation();
        let mut output = TimeSeriesOutput::new();
        output.init_profile_output(
            &simulation,
            "HeatPump",
            simulation.owned_node_ids(),
            &["power", "temperature"],
        );
        output
    }

    #[test]
    fn test_uninitialised_output_has_no_points() {
        assert!(TimeSeriesOutput::new().to_points().is_empty());
    }

    #[test]
    fn test_points_are_stamped_two_steps_ahead() {
        let hp = NodeId::from("hp");
        let mut output = output();
        output.set_time_step_data_point(&hp, "power", 1, 4.0).unwrap();
        output.set_time_step_data_point(&hp, "power", 3, f64::NAN).unwrap();

        let points = output.to_points();
        assert_eq!(points.len(), 6);

        let first = &points[0];
        assert_eq!(first.time, "2024-01-01T00:30:00Z");
        assert_eq!(first.fields["power"], 4.0);
        assert_eq!(first.fields["temperature"], 0.0);
        assert_eq!(first.tags["esdl_id"], "hp");
        assert_eq!(first.tags["esdl_name"], "Heat pump");
        assert_eq!(first.tags["simulation_id"], "sim");
        assert_eq!(first.tags["model_id"], "model");
        assert_eq!(points[1].tags["esdl_name"], "HeatPump");
        assert_eq!(points[4].time, "2024-01-01T01:00:00Z");
        assert_eq!(points[4].fields["power"], 0.0);
    }

    #[test]
    fn test_summary_points_use_first_timestamp() {
        let pv = NodeId::from("pv");
        let mut output = output();
        output.set_summary_data_point(&pv, "total", 12.5).unwrap();

        let points = output.to_points();
        let summary = points.last().unwrap();
        assert_eq!(points.len(), 7);
        assert_eq!(summary.time, "2024-01-01T00:30:00Z");
        assert_eq!(summary.fields.len(), 1);
        assert_eq!(summary.fields["total"], 12.5);
    }

    #[test]
    fn test_out_of_range_step_is_rejected() {
        let hp = NodeId::from("hp");
        let mut output = output();
        assert_matches!(
            output.set_time_step_data_point(&hp, "power", 0, 1.0),
            Err(DotsError::ProtocolViolation(_))
        );
        assert_matches!(
            output.set_time_step_data_point(&hp, "power", 4, 1.0),
            Err(DotsError::ProtocolViolation(_))
        );
        assert_matches!(
            output.set_time_step_data_point(&hp, "unknown", 1, 1.0),
            Err(DotsError::ProtocolViolation(_))
        );
        assert_eq!(output.time_step_value(&hp, "power", 2), Some(0.0));
    }

    #[tokio::test]
    async fn test_memory_sink_collects_points() {
        let sink = MemoryTimeSeriesSink::new();
        sink.write(output().to_points()).await.unwrap();
        assert_eq!(sink.points().len(), 6);
        NullTimeSeriesSink.write(Vec::new()).await.unwrap();
    }
}
