//! Validation tests - schema decoding, typed validation and transforms.

use std::sync::Arc;

use proptest::prelude::*;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{dispatcher, echo};
use crate::schema::{PreparedSchema, SchemaCache, SchemaParser, TypeSchemaParser};
use crate::transform::{map_string, tuple_to_object};
use crate::validation::{is_valid_email, validate_name};
use crate::{
    Context, EmptyContext, FieldError, Procedure, ProcedureType, ResultEnvelope, Router,
    RpcErrorCode, RpcResult, TypeSchema, Validate, ValidationResult, ValidationRules, transformer,
};

// =============================================================================
// Test Helpers
// =============================================================================

fn decode(schema: &TypeSchema, value: Value) -> Result<Value, Vec<FieldError>> {
    TypeSchemaParser::new().decode(schema, &value)
}

fn fields(errors: &[FieldError]) -> Vec<&str> {
    errors.iter().map(|e| e.field.as_str()).collect()
}

fn user_schema() -> TypeSchema {
    TypeSchema::object()
        .with_required_property("name", TypeSchema::string().with_min_length(2))
        .with_required_property("email", TypeSchema::string().with_format("email"))
        .with_property("age", TypeSchema::integer().with_minimum(0.0).with_maximum(150.0))
        .with_property(
            "tags",
            TypeSchema::array(TypeSchema::string().with_max_length(5)).with_max_length(3),
        )
        .with_property(
            "address",
            TypeSchema::object().with_required_property("city", TypeSchema::string()),
        )
}

async fn run(procedure: Procedure<EmptyContext>, input: Value) -> ResultEnvelope {
    dispatcher(Router::builder().procedure("target", procedure))
        .dispatch("target", ProcedureType::Query, input, Context::default())
        .await
}

// =============================================================================
// Schema decoding
// =============================================================================

#[test]
fn valid_input_decodes_unchanged() {
    let input = json!({
        "name": "Ada",
        "email": "ada@example.com",
        "age": 36,
        "tags": ["math"],
        "address": {"city": "London"}
    });
    assert_eq!(decode(&user_schema(), input.clone()), Ok(input));
}

#[test]
fn every_violation_is_reported() {
    let errors = decode(
        &user_schema(),
        json!({
            "name": "A",
            "email": "not-an-email",
            "age": 200,
            "tags": ["ok", "much too long", "a", "b"],
            "address": {}
        }),
    )
    .unwrap_err();

    assert_eq!(
        fields(&errors),
        vec!["name", "email", "age", "tags", "tags[1]", "address.city"]
    );
    let codes: Vec<&str> = errors.iter().map(|e| e.code.as_str()).collect();
    assert_eq!(
        codes,
        vec!["min_length", "email", "maximum", "max_items", "max_length", "required"]
    );
}

#[test]
fn missing_required_fields_are_listed() {
    let errors = decode(&user_schema(), json!({})).unwrap_err();
    assert_eq!(fields(&errors), vec!["name", "email"]);
    assert!(errors.iter().all(|e| e.code == "required"));
}

#[test]
fn type_mismatch_stops_descent() {
    let errors = decode(&user_schema(), json!({"name": 5, "email": "a@b.co", "address": "x"}))
        .unwrap_err();
    assert_eq!(fields(&errors), vec!["name", "address"]);
    assert_eq!(errors[0].message, "name must be of type string, received number");
}

#[test]
fn root_errors_use_an_empty_path() {
    let errors = decode(&TypeSchema::string(), json!(1)).unwrap_err();
    assert_eq!(errors[0].field, "");
    assert_eq!(errors[0].message, "value must be of type string, received number");
}

#[test]
fn lengths_count_characters() {
    let schema = TypeSchema::string().with_min_length(4).with_max_length(4);
    assert!(decode(&schema, json!("ßüöä")).is_ok());
    assert!(decode(&schema, json!("abc")).is_err());
}

#[test]
fn integers_reject_fractions() {
    let schema = TypeSchema::integer();
    assert!(decode(&schema, json!(3)).is_ok());
    assert!(decode(&schema, json!(3.0)).is_ok());
    assert!(decode(&schema, json!(3.5)).is_err());
}

#[test]
fn nullable_accepts_null() {
    assert!(decode(&TypeSchema::string(), Value::Null).is_err());
    assert!(decode(&TypeSchema::string().nullable(), Value::Null).is_ok());
    assert!(decode(&TypeSchema::null(), Value::Null).is_ok());
    assert!(decode(&TypeSchema::any(), json!({"anything": [1]})).is_ok());
}

#[test]
fn enum_and_pattern_constraints() {
    let status = TypeSchema::string().with_enum(["active", "disabled"]);
    assert!(decode(&status, json!("active")).is_ok());
    let errors = decode(&status, json!("gone")).unwrap_err();
    assert_eq!(errors[0].code, "enum");
    assert!(errors[0].message.contains("\"active\""));

    let sku = TypeSchema::string().with_pattern("^[A-Z]{3}-[0-9]+$");
    assert!(decode(&sku, json!("ABC-12")).is_ok());
    assert_eq!(decode(&sku, json!("abc")).unwrap_err()[0].code, "pattern");
}

#[test]
fn invalid_pattern_is_reported_without_regex_details() {
    let schema = TypeSchema::string().with_pattern("(unclosed");
    let errors = decode(&schema, json!("anything")).unwrap_err();
    assert_eq!(errors[0].code, "invalid_pattern");
    assert_eq!(errors[0].message, "Invalid validation pattern");
}

#[test]
fn array_min_items() {
    let schema = TypeSchema::array(TypeSchema::number()).with_min_length(2);
    let errors = decode(&schema, json!([1])).unwrap_err();
    assert_eq!(errors[0].code, "min_items");
    let errors = decode(&schema, json!([1, "two"])).unwrap_err();
    assert_eq!(fields(&errors), vec!["[1]"]);
}

// =============================================================================
// Schema cache
// =============================================================================

#[test]
fn cache_compiles_each_schema_once() {
    let cache = Arc::new(SchemaCache::new());
    let parser = TypeSchemaParser::with_cache(Arc::clone(&cache));
    let schema = user_schema();

    for _ in 0..3 {
        let _ = parser.decode(&schema, &json!({}));
    }
    let _ = parser.decode(&TypeSchema::string(), &json!("x"));

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.stats(), (2, 2));

    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn prepared_schemas_share_the_cache_entry() {
    let cache = Arc::new(SchemaCache::new());
    let parser = TypeSchemaParser::with_cache(Arc::clone(&cache));
    let prepared = PreparedSchema::new(user_schema());
    assert_eq!(prepared.fingerprint(), user_schema().fingerprint());

    for _ in 0..3 {
        let _ = parser.decode_prepared(&prepared, &json!({}));
    }
    let _ = parser.decode(&user_schema(), &json!({}));

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.stats(), (3, 1));
}

#[tokio::test]
async fn dispatch_reuses_the_compiled_input_schema() {
    let cache = Arc::new(SchemaCache::new());
    let router = Router::builder()
        .procedure("user", Procedure::builder().input(user_schema()).query(echo))
        .build()
        .unwrap();
    let dispatcher = crate::Dispatcher::new(router)
        .with_parser(TypeSchemaParser::with_cache(Arc::clone(&cache)));

    for _ in 0..4 {
        let envelope = dispatcher
            .dispatch(
                "user",
                ProcedureType::Query,
                json!({"name": "Ada", "email": "ada@example.com"}),
                Context::default(),
            )
            .await;
        assert!(envelope.is_ok());
    }

    assert_eq!(cache.len(), 1);
    assert_eq!(cache.stats(), (3, 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cache_is_safe_under_concurrent_use() {
    let parser = Arc::new(TypeSchemaParser::new());
    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let parser = Arc::clone(&parser);
            tokio::spawn(async move {
                let schema = TypeSchema::string().with_min_length(i % 4);
                parser.decode(&schema, &json!("abcd")).is_ok()
            })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap());
    }
    assert_eq!(parser.cache().len(), 4);
}

// =============================================================================
// Typed validation
// =============================================================================

#[derive(Deserialize)]
struct CreateUser {
    name: String,
    email: String,
    age: i64,
}

impl Validate for CreateUser {
    fn validate(&self) -> ValidationResult {
        ValidationRules::new()
            .required("name", &self.name)
            .min_length("name", &self.name, 2)
            .email("email", &self.email)
            .range("age", self.age, 0, 150)
            .build()
    }
}

async fn create_user(_ctx: Context<EmptyContext>, input: CreateUser) -> RpcResult<String> {
    Ok(format!("{} <{}>", input.name, input.email))
}

#[tokio::test]
async fn validated_handlers_reject_bad_input() {
    let procedure = Procedure::builder().query_validated(create_user);

    let envelope = run(
        procedure.clone(),
        json!({"name": "Ada", "email": "ada@example.com", "age": 36}),
    )
    .await;
    assert_eq!(envelope.data(), Some(&json!("Ada <ada@example.com>")));

    let envelope = run(procedure, json!({"name": "", "email": "nope", "age": -1})).await;
    let error = envelope.error().unwrap();
    assert_eq!(error.code, RpcErrorCode::BadRequest);
    let errors = error.details.as_ref().unwrap()["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 4);
}

#[tokio::test]
async fn undeserializable_input_is_bad_request() {
    let procedure = Procedure::builder().query(create_user);
    let envelope = run(procedure, json!({"name": "Ada"})).await;

    let error = envelope.error().unwrap();
    assert_eq!(error.code, RpcErrorCode::BadRequest);
    assert!(error.message.starts_with("Invalid input"));
}

#[test]
fn rules_collect_every_failure() {
    let result = ValidationRules::new()
        .required("name", "   ")
        .max_length("bio", "four", 3)
        .pattern("zip", "12a45", r"^\d{5}$")
        .custom("terms", || false, "terms must be accepted")
        .build();

    assert!(!result.is_valid());
    assert_eq!(fields(result.errors()), vec!["name", "bio", "zip", "terms"]);
    assert_eq!(result.errors()[3].message, "terms must be accepted");

    let error = result.into_result().unwrap_err();
    assert_eq!(error.code, RpcErrorCode::BadRequest);
    assert!(ValidationResult::from_errors(vec![]).is_valid());
}

#[test]
fn email_check() {
    assert!(is_valid_email("a@b.co"));
    assert!(!is_valid_email("a@b"));
    assert!(!is_valid_email("@b.co"));
    assert!(!is_valid_email("a@@b.co"));
    assert!(!is_valid_email("a@.co"));
}

#[test]
fn names_are_restricted() {
    assert!(validate_name("users").is_ok());
    assert!(validate_name("get-by_id2").is_ok());
    assert!(validate_name("").is_err());
    assert!(validate_name("a.b").is_err());
    assert!(validate_name("with space").is_err());
}

// =============================================================================
// Transforms
// =============================================================================

#[tokio::test]
async fn field_transforms_run_after_validation() {
    let procedure = Procedure::builder()
        .input(TypeSchema::object().with_required_property(
            "at",
            TypeSchema::array(TypeSchema::number()).with_min_length(2).with_max_length(2),
        ))
        .transform_field("at", tuple_to_object(&["lat", "lng"]))
        .query(echo);

    let envelope = run(procedure.clone(), json!({"at": [52.5, 13.4]})).await;
    assert_eq!(envelope.data(), Some(&json!({"at": {"lat": 52.5, "lng": 13.4}})));

    // Rejected by the schema before the transform sees it.
    let envelope = run(procedure, json!({"at": [1]})).await;
    assert!(envelope.error().unwrap().message.starts_with("Input validation failed"));
}

#[tokio::test]
async fn transform_failures_are_bad_requests() {
    let procedure = Procedure::builder()
        .transform_field(
            "when",
            map_string(|s| {
                s.parse::<i64>()
                    .map(Value::from)
                    .map_err(|e| format!("not a timestamp: {e}"))
            }),
        )
        .transform_field("at", tuple_to_object(&["lat", "lng"]))
        .query(echo);

    let envelope = run(procedure.clone(), json!({"when": "1700000000"})).await;
    assert_eq!(envelope.data(), Some(&json!({"when": 1_700_000_000})));

    let envelope = run(procedure, json!({"when": "soon", "at": "here"})).await;
    let error = envelope.error().unwrap();
    assert_eq!(error.code, RpcErrorCode::BadRequest);
    assert!(error.message.starts_with("Input transformation failed"));
    let errors = error.details.as_ref().unwrap()["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 2);
}

#[tokio::test]
async fn whole_transforms_follow_field_transforms() {
    let procedure = Procedure::builder()
        .transform_field("n", transformer(|v| Ok(json!(v.as_i64().unwrap_or(0) * 10))))
        .transform_input(transformer(|v| Ok(json!({"wrapped": v}))))
        .map_output(transformer(|v| Ok(json!([v]))))
        .query(echo);

    let envelope = run(procedure, json!({"n": 4})).await;
    assert_eq!(envelope.data(), Some(&json!([{"wrapped": {"n": 40}}])));
}

#[tokio::test]
async fn output_map_failure_is_a_server_error() {
    let procedure = Procedure::builder()
        .map_output(transformer(|_| Err("cannot encode".to_string())))
        .query(echo);

    let envelope = run(procedure, json!(1)).await;
    assert_eq!(envelope.error().unwrap().code, RpcErrorCode::InternalServerError);
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    /// Strings are accepted exactly when their character count is in range.
    #[test]
    fn prop_string_length_bounds(s in "\\PC{0,12}", min in 0usize..6, extra in 0usize..6) {
        let max = min + extra;
        let schema = TypeSchema::string().with_min_length(min).with_max_length(max);
        let len = s.chars().count();
        let accepted = decode(&schema, json!(s)).is_ok();
        prop_assert_eq!(accepted, (min..=max).contains(&len));
    }

    /// One error per out-of-range number, at the right index.
    #[test]
    fn prop_array_item_errors(items in prop::collection::vec(-20i64..20, 0..10)) {
        let schema = TypeSchema::array(TypeSchema::integer().with_minimum(0.0));
        let expected: Vec<String> = items
            .iter()
            .enumerate()
            .filter(|(_, n)| **n < 0)
            .map(|(i, _)| format!("[{i}]"))
            .collect();

        match decode(&schema, json!(items)) {
            Ok(_) => prop_assert!(expected.is_empty()),
            Err(errors) => {
                let actual: Vec<String> = errors.into_iter().map(|e| e.field).collect();
                prop_assert_eq!(actual, expected);
            }
        }
    }
}
