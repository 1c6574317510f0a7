use std::sync::{Arc, Mutex};

use actix_cors::Cors;
use actix_web::{get, put, web, App, HttpResponse, HttpServer, Responder};
use log::{info, warn};
use serde::Deserialize;

use pcfg_core::enumerate::Sampler;
use pcfg_core::io::{list_rulesets, ruleset_path};
use pcfg_core::{load_ruleset, Driver, GrammarStore, LoadOptions, TerminationPolicy};

/// Directory holding the rulesets.
const RULES_ROOT: &str = "./Rules";

/// Upper bound on guesses returned by one request.
const MAX_GUESSES_PER_REQUEST: u64 = 100_000;

/// Struct representing query parameters for the `/v1/guesses` endpoint
#[derive(Deserialize)]
struct GuessParams {
	max_guesses: Option<u64>,
	min_probability: Option<f64>,
}

#[derive(Deserialize)]
struct SampleParams {
	count: Option<u64>,
}

#[derive(Deserialize)]
struct RulesetQuery {
	name: Option<String>,
}

#[derive(Default)]
struct SharedData {
	grammar: Option<Arc<GrammarStore>>,
	name: Option<String>,
}

impl GuessParams {
	/// Builds the termination policy of a request.
	///
	/// `max_guesses` defaults to 100 and is capped, so a request never
	/// enumerates the whole space.
	fn policy(&self) -> Result<TerminationPolicy, String> {
		let mut policy = TerminationPolicy::new();
		policy.maximum_guesses = Some(self.max_guesses.unwrap_or(100).min(MAX_GUESSES_PER_REQUEST));
		policy.set_minimum_probability(self.min_probability)?;
		Ok(policy)
	}
}

/// Returns the loaded grammar, if any, without holding the lock afterwards.
fn loaded_grammar(data: &web::Data<Mutex<SharedData>>) -> Result<Arc<GrammarStore>, HttpResponse> {
	let shared_data = match data.lock() {
		Ok(m) => m,
		Err(_) => return Err(HttpResponse::InternalServerError().body("Grammar lock failed")),
	};
	match &shared_data.grammar {
		Some(grammar) => Ok(Arc::clone(grammar)),
		None => Err(HttpResponse::Conflict().body("No ruleset loaded")),
	}
}

/// HTTP GET endpoint `/v1/guesses`
///
/// Enumerates guesses of the loaded ruleset, most probable first.
/// Returns one guess per line.
#[get("/v1/guesses")]
async fn get_guesses(data: web::Data<Mutex<SharedData>>, query: web::Query<GuessParams>) -> impl Responder {
	let policy = match query.policy() {
		Ok(p) => p,
		Err(e) => return HttpResponse::BadRequest().body(e),
	};
	let grammar = match loaded_grammar(&data) {
		Ok(g) => g,
		Err(response) => return response,
	};

	let enumeration = web::block(move || {
		let mut body = Vec::new();
		Driver::new(&grammar, policy).run(&mut body).map(|_| body)
	});
	match enumeration.await {
		Ok(Ok(body)) => HttpResponse::Ok().content_type("text/plain; charset=utf-8").body(body),
		Ok(Err(e)) => HttpResponse::InternalServerError().body(e.to_string()),
		Err(_) => HttpResponse::InternalServerError().body("Enumeration task failed"),
	}
}

/// HTTP GET endpoint `/v1/sample`
///
/// Draws random guesses following the grammar probabilities.
#[get("/v1/sample")]
async fn get_sample(data: web::Data<Mutex<SharedData>>, query: web::Query<SampleParams>) -> impl Responder {
	let count = query.count.unwrap_or(10).min(MAX_GUESSES_PER_REQUEST);
	let grammar = match loaded_grammar(&data) {
		Ok(g) => g,
		Err(response) => return response,
	};

	let sampling = web::block(move || {
		let sampler = Sampler::new(&grammar);
		(0..count)
			.map(|_| sampler.sample().map(|sample| sample.guess))
			.collect::<Option<Vec<String>>>()
	});
	match sampling.await {
		Ok(Some(guesses)) => HttpResponse::Ok().content_type("text/plain; charset=utf-8").body(guesses.join("\n")),
		Ok(None) => HttpResponse::UnprocessableEntity().body("No base structure has a positive probability"),
		Err(_) => HttpResponse::InternalServerError().body("Sampling task failed"),
	}
}

#[get("/v1/rulesets")]
async fn get_rulesets() -> impl Responder {
	match list_rulesets(RULES_ROOT) {
		Ok(names) => HttpResponse::Ok().body(names.join("\n")),
		Err(_) => HttpResponse::InternalServerError().body("Failed to list rulesets"),
	}
}

#[get("/v1/loaded_ruleset")]
async fn get_loaded_ruleset(data: web::Data<Mutex<SharedData>>) -> impl Responder {
	let shared_data = match data.lock() {
		Ok(m) => m,
		Err(_) => return HttpResponse::InternalServerError().body("Grammar lock failed"),
	};
	HttpResponse::Ok().body(shared_data.name.clone().unwrap_or_default())
}

#[put("/v1/load_ruleset")]
async fn put_ruleset(data: web::Data<Mutex<SharedData>>, query: web::Query<RulesetQuery>) -> impl Responder {
	let name = match &query.name {
		Some(s) if !s.trim().is_empty() => s.trim(),
		_ => return HttpResponse::BadRequest().body("Missing or empty ruleset name"),
	};

	// Only names found under the rules root, never arbitrary paths
	match list_rulesets(RULES_ROOT) {
		Ok(names) if names.iter().any(|n| n == name) => (),
		Ok(_) => return HttpResponse::NotFound().body(format!("Unknown ruleset: {name}")),
		Err(_) => return HttpResponse::InternalServerError().body("Failed to list rulesets"),
	}

	let path = ruleset_path(RULES_ROOT, name);
	let grammar = match web::block(move || load_ruleset(path, &LoadOptions::default())).await {
		Ok(Ok(g)) => g,
		Ok(Err(e)) => {
			warn!("Failed to load ruleset {name}: {e}");
			return HttpResponse::InternalServerError().body(format!("Failed to load ruleset: {e}"));
		}
		Err(_) => return HttpResponse::InternalServerError().body("Loading task failed"),
	};

	let mut shared_data = match data.lock() {
		Ok(m) => m,
		Err(_) => return HttpResponse::InternalServerError().body("Grammar lock failed"),
	};
	shared_data.grammar = Some(Arc::new(grammar));
	shared_data.name = Some(name.to_owned());
	info!("Ruleset {name} loaded");

	HttpResponse::Ok().body("Ruleset loaded successfully")
}

/// Main entry point for the server.
///
/// Starts with no ruleset loaded; `PUT /v1/load_ruleset` loads one.
/// The grammar is shared behind an `Arc`, so requests only hold the
/// lock long enough to clone it.
///
/// # Notes
/// - The server binds to 127.0.0.1:5000.
/// - Rulesets are read from `./Rules`.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
	env_logger::init();

	let shared_data = web::Data::new(Mutex::new(SharedData::default()));
	info!("Listening on 127.0.0.1:5000");

	HttpServer::new(move || {
		App::new()
			.wrap(Cors::permissive())
			.app_data(shared_data.clone())
			.service(get_guesses)
			.service(get_sample)
			.service(get_rulesets)
			.service(put_ruleset)
			.service(get_loaded_ruleset)
	})
		.bind(("127.0.0.1", 5000))?
		.run()
		.await
}

#[cfg(test)]
mod tests {
	use actix_web::http::StatusCode;
	use actix_web::test;
	use pcfg_core::grammar::{BaseStructure, BucketTable, RankBucket, TerminalKey};

	use super::*;

	/// Shared state with a three-word `L3` grammar loaded.
	fn letters() -> web::Data<Mutex<SharedData>> {
		let table = BucketTable::new(vec![
			RankBucket::new(0.6, vec!["cat".to_owned()]),
			RankBucket::new(0.4, vec!["dog".to_owned(), "fox".to_owned()]),
		]);
		let grammar = GrammarStore::new(vec![BaseStructure::parse("L3", 1.0).unwrap()], vec![(TerminalKey::new("L", 3), table)])
			.unwrap();
		web::Data::new(Mutex::new(SharedData {
			grammar: Some(Arc::new(grammar)),
			name: Some("Letters".to_owned()),
		}))
	}

	#[actix_web::test]
	async fn guesses_endpoint_enumerates_in_order() {
		let app = test::init_service(App::new().app_data(letters()).service(get_guesses)).await;
		let req = test::TestRequest::get().uri("/v1/guesses?max_guesses=2").to_request();
		let body = test::call_and_read_body(&app, req).await;
		assert_eq!(&body[..], b"cat\ndog\n");
	}

	#[actix_web::test]
	async fn guesses_endpoint_needs_a_ruleset() {
		let data = web::Data::new(Mutex::new(SharedData::default()));
		let app = test::init_service(App::new().app_data(data).service(get_guesses)).await;
		let req = test::TestRequest::get().uri("/v1/guesses").to_request();
		let resp = test::call_service(&app, req).await;
		assert_eq!(resp.status(), StatusCode::CONFLICT);
	}

	#[actix_web::test]
	async fn sample_endpoint_draws_from_the_grammar() {
		let app = test::init_service(App::new().app_data(letters()).service(get_sample)).await;
		let req = test::TestRequest::get().uri("/v1/sample?count=5").to_request();
		let body = test::call_and_read_body(&app, req).await;
		let text = String::from_utf8(body.to_vec()).unwrap();

		assert_eq!(text.lines().count(), 5);
		assert!(text.lines().all(|guess| ["cat", "dog", "fox"].contains(&guess)));
	}

	#[::core::prelude::v1::test]
	fn guess_params_defaults_and_cap() {
		let params = GuessParams {
			max_guesses: None,
			min_probability: None,
		};
		assert_eq!(params.policy().unwrap().maximum_guesses, Some(100));

		let params = GuessParams {
			max_guesses: Some(u64::MAX),
			min_probability: Some(0.01),
		};
		let policy = params.policy().unwrap();
		assert_eq!(policy.maximum_guesses, Some(MAX_GUESSES_PER_REQUEST));
		assert_eq!(policy.minimum_probability(), Some(0.01));
	}

	#[::core::prelude::v1::test]
	fn guess_params_reject_bad_probability() {
		let params = GuessParams {
			max_guesses: None,
			min_probability: Some(1.5),
		};
		assert!(params.policy().is_err());
	}
}
