use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vector_output::Vector;
use qdrant_client::qdrant::{DenseVector, PointId, RetrievedPoint, ScrollPointsBuilder, Value};
use qdrant_client::Qdrant;
use tokio::runtime::{Builder as RuntimeBuilder, Runtime};
use tracing::{debug, info};

use crate::config::{Number, StoreSettings};
use crate::error::{PipelineError, Result};
use crate::store::{AttributeValue, ScrollRequest, StoredPoint, VectorStore};

/// Blocking handle on a Qdrant collection over gRPC.
///
/// Owns its own current-thread runtime; the client and the runtime are
/// released together when the store is dropped.
pub struct QdrantStore {
    client: Qdrant,
    runtime: Runtime,
    endpoint: String,
}

impl QdrantStore {
    pub fn connect(settings: &StoreSettings) -> Result<Self> {
        let unavailable = |reason: String| PipelineError::StoreUnavailable {
            endpoint: settings.store_endpoint.clone(),
            reason,
        };

        let runtime = RuntimeBuilder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| unavailable(format!("failed to start runtime: {}", e)))?;

        info!("Connecting to Qdrant at {}", settings.store_endpoint);
        let client = Qdrant::from_url(&settings.store_endpoint)
            .api_key(settings.api_key.clone())
            .build()
            .map_err(|e| unavailable(e.to_string()))?;

        Ok(Self {
            client,
            runtime,
            endpoint: settings.store_endpoint.clone(),
        })
    }
}

impl VectorStore for QdrantStore {
    fn scroll(&mut self, request: &ScrollRequest) -> Result<Vec<StoredPoint>> {
        let exists = self
            .runtime
            .block_on(self.client.collection_exists(request.collection.as_str()))
            .map_err(|e| PipelineError::StoreUnavailable {
                endpoint: self.endpoint.clone(),
                reason: e.to_string(),
            })?;
        if !exists {
            return Err(PipelineError::CollectionNotFound(request.collection.clone()));
        }

        let limit = u32::try_from(request.limit).unwrap_or(u32::MAX);
        let scroll = ScrollPointsBuilder::new(request.collection.as_str())
            .limit(limit)
            .with_payload(true)
            .with_vectors(true);

        let response = self
            .runtime
            .block_on(self.client.scroll(scroll))
            .map_err(|e| PipelineError::Query {
                collection: request.collection.clone(),
                reason: e.to_string(),
            })?;

        if response.next_page_offset.is_some() {
            debug!(
                "Collection '{}' holds more than {} points, the rest are not fetched",
                request.collection, request.limit
            );
        }

        Ok(response
            .result
            .into_iter()
            .map(|point| stored_point(point, &request.attribute_key, request.vector_name.as_deref()))
            .collect())
    }
}

fn stored_point(point: RetrievedPoint, attribute_key: &str, vector_name: Option<&str>) -> StoredPoint {
    let RetrievedPoint { id, payload, vectors, .. } = point;

    let vector = vectors
        .and_then(|v| match vector_name {
            None => v.get_vector(),
            Some(name) => v.get_vector_by_name(name),
        })
        .and_then(dense);

    StoredPoint {
        id: point_id(id),
        vector,
        attribute: attribute(payload.get(attribute_key)),
    }
}

fn dense(vector: Vector) -> Option<Vec<Number>> {
    match vector {
        Vector::Dense(DenseVector { data }) => Some(data),
        Vector::Sparse(_) | Vector::MultiDense(_) => None,
    }
}

fn point_id(id: Option<PointId>) -> String {
    match id.and_then(|id| id.point_id_options) {
        Some(PointIdOptions::Num(num)) => num.to_string(),
        Some(PointIdOptions::Uuid(uuid)) => uuid,
        None => "<unknown>".to_string(),
    }
}

fn attribute(value: Option<&Value>) -> AttributeValue {
    match value.and_then(|v| v.kind.as_ref()) {
        None | Some(Kind::NullValue(_)) => AttributeValue::Missing,
        Some(Kind::DoubleValue(v)) => AttributeValue::Number(*v),
        Some(Kind::IntegerValue(v)) => AttributeValue::Number(*v as f64),
        Some(Kind::BoolValue(_)) => AttributeValue::NonNumeric("a boolean".to_string()),
        Some(Kind::StringValue(_)) => AttributeValue::NonNumeric("a string".to_string()),
        Some(Kind::ListValue(_)) => AttributeValue::NonNumeric("a list".to_string()),
        Some(Kind::StructValue(_)) => AttributeValue::NonNumeric("an object".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::vectors_output::VectorsOptions;
    use qdrant_client::qdrant::{NamedVectorsOutput, SparseVector, VectorOutput, VectorsOutput};
    use std::collections::HashMap;

    fn number(v: f64) -> Value {
        Value {
            kind: Some(Kind::DoubleValue(v)),
        }
    }

    fn output(data: Vec<f32>) -> VectorOutput {
        VectorOutput {
            vector: Some(Vector::Dense(DenseVector { data })),
            ..Default::default()
        }
    }

    #[allow(deprecated)]
    fn legacy_output(data: Vec<f32>) -> VectorOutput {
        VectorOutput {
            data,
            ..Default::default()
        }
    }

    fn retrieved(id: u64, options: VectorsOptions, payload: HashMap<String, Value>) -> RetrievedPoint {
        RetrievedPoint {
            id: Some(PointId {
                point_id_options: Some(PointIdOptions::Num(id)),
            }),
            payload,
            vectors: Some(VectorsOutput {
                vectors_options: Some(options),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn converts_unnamed_vector_and_attribute() {
        let payload = HashMap::from([("compound".to_string(), number(0.4))]);
        let point = retrieved(7, VectorsOptions::Vector(output(vec![1.0, 2.0])), payload);
        let stored = stored_point(point, "compound", None);
        assert_eq!(stored.id, "7");
        assert_eq!(stored.vector, Some(vec![1.0, 2.0]));
        assert_eq!(stored.attribute, AttributeValue::Number(0.4));
    }

    #[test]
    fn missing_payload_key_is_missing_attribute() {
        let point = retrieved(1, VectorsOptions::Vector(output(vec![1.0])), HashMap::new());
        assert_eq!(stored_point(point, "compound", None).attribute, AttributeValue::Missing);
    }

    #[test]
    fn integer_and_string_attributes() {
        let ints = HashMap::from([(
            "compound".to_string(),
            Value {
                kind: Some(Kind::IntegerValue(3)),
            },
        )]);
        let point = retrieved(1, VectorsOptions::Vector(output(vec![1.0])), ints);
        assert_eq!(stored_point(point, "compound", None).attribute, AttributeValue::Number(3.0));

        let strings = HashMap::from([(
            "compound".to_string(),
            Value {
                kind: Some(Kind::StringValue("high".to_string())),
            },
        )]);
        let point = retrieved(1, VectorsOptions::Vector(output(vec![1.0])), strings);
        assert!(matches!(
            stored_point(point, "compound", None).attribute,
            AttributeValue::NonNumeric(_)
        ));
    }

    #[test]
    fn selects_named_vector() {
        let named = NamedVectorsOutput {
            vectors: HashMap::from([
                ("text".to_string(), output(vec![0.5, 0.25])),
                ("image".to_string(), output(vec![9.0])),
            ]),
        };
        let point = retrieved(2, VectorsOptions::Vectors(named.clone()), HashMap::new());
        assert_eq!(stored_point(point, "compound", Some("text")).vector, Some(vec![0.5, 0.25]));

        let point = retrieved(2, VectorsOptions::Vectors(named), HashMap::new());
        assert_eq!(stored_point(point, "compound", None).vector, None);
    }

    #[test]
    fn reads_dense_vector_from_current_and_legacy_fields() {
        let point = retrieved(3, VectorsOptions::Vector(output(vec![1.0, 2.0, 3.0])), HashMap::new());
        assert_eq!(stored_point(point, "compound", None).vector, Some(vec![1.0, 2.0, 3.0]));

        let point = retrieved(3, VectorsOptions::Vector(legacy_output(vec![4.0, 5.0])), HashMap::new());
        assert_eq!(stored_point(point, "compound", None).vector, Some(vec![4.0, 5.0]));
    }

    #[test]
    fn sparse_vector_is_not_dense() {
        let sparse = VectorOutput {
            vector: Some(Vector::Sparse(SparseVector {
                values: vec![0.5],
                indices: vec![3],
            })),
            ..Default::default()
        };
        let point = retrieved(4, VectorsOptions::Vector(sparse), HashMap::new());
        assert_eq!(stored_point(point, "compound", None).vector, None);
    }

    #[test]
    fn unreachable_endpoint_is_store_unavailable() {
        let settings = StoreSettings {
            store_endpoint: "http://127.0.0.1:1".to_string(),
            api_key: None,
            collection_name: "bluesky".to_string(),
            vector_name: None,
            attribute_key: "compound".to_string(),
            fetch_limit: 10,
        };
        let request = ScrollRequest::from_settings(&settings);
        let outcome = QdrantStore::connect(&settings).and_then(|mut store| store.scroll(&request));
        assert!(
            matches!(outcome, Err(PipelineError::StoreUnavailable { .. })),
            "got {:?}",
            outcome.map(|points| points.len())
        );
    }
}
