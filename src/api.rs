// src/api.rs
use crate::auth::{
    clear_cookie, cookie_value, set_cookie, OidcClient, TokenSigner, UserSession, FLASH_COOKIE,
    STATE_COOKIE,
};
use crate::catalog::CatalogCache;
use crate::db::HoldingStore;
use crate::error::AppError;
use crate::forms::{AddStockForm, RemoveStockForm};
use crate::models::{Flash, Holding, PortfolioTotal, StockYield};
use crate::quotes::QuoteSource;
use crate::valuation::valuate;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use uuid::Uuid;
use warp::http::header::{HeaderValue, LOCATION, SET_COOKIE};
use warp::http::StatusCode;
use warp::hyper::Body;
use warp::path::FullPath;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

const FORM_LIMIT: u64 = 16 * 1024;

pub struct AppState {
    pub store: Arc<dyn HoldingStore>,
    pub quotes: Arc<dyn QuoteSource>,
    pub catalog: Arc<CatalogCache>,
    pub signer: TokenSigner,
    pub oidc: Arc<OidcClient>,
    pub session_cookie: String,
    pub cookie_secure: bool,
    pub callback_route: String,
}

#[derive(Serialize)]
struct UserView<'a> {
    sub: &'a str,
    name: Option<&'a str>,
    email: Option<&'a str>,
}

#[derive(Serialize)]
struct HoldingRow<'a> {
    #[serde(flatten)]
    holding: &'a Holding,
    #[serde(rename = "yield")]
    stock_yield: &'a StockYield,
}

#[derive(Serialize)]
struct PortfolioPage<'a> {
    user: UserView<'a>,
    holdings: Vec<HoldingRow<'a>>,
    total: PortfolioTotal,
    flashes: Vec<Flash>,
}

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let root = warp::path::end()
        .and(warp::get())
        .map(|| redirect("/stocks/main", Vec::new()));

    let main_page = warp::path!("stocks" / "main")
        .and(warp::get())
        .and(with_user(state.clone()))
        .and(with_cookies())
        .and(with_state(state.clone()))
        .and_then(main_page_handler);

    let add_stock = warp::path!("stocks" / "main")
        .and(warp::post())
        .and(with_user(state.clone()))
        .and(warp::body::content_length_limit(FORM_LIMIT))
        .and(warp::body::form::<AddStockForm>())
        .and(with_state(state.clone()))
        .and_then(add_stock_handler);

    let remove_stock = warp::path!("stocks" / "remove_stock")
        .and(warp::post())
        .and(with_user(state.clone()))
        .and(warp::body::content_length_limit(FORM_LIMIT))
        .and(warp::body::form::<RemoveStockForm>())
        .and(with_state(state.clone()))
        .and_then(remove_stock_handler);

    let login = warp::path!("stocks" / "login")
        .and(get_or_post())
        .and(with_user(state.clone()))
        .and(with_state(state.clone()))
        .and_then(|user: Option<UserSession>, state: Arc<AppState>| {
            login_handler(user, state, "/stocks/main")
        });

    let register = warp::path!("stocks" / "register")
        .and(get_or_post())
        .and(with_user(state.clone()))
        .and(with_state(state.clone()))
        .and_then(|user: Option<UserSession>, state: Arc<AppState>| {
            login_handler(user, state, "/stocks/index")
        });

    let logout = warp::path!("stocks" / "logout")
        .and(get_or_post())
        .and(with_state(state.clone()))
        .map(|state: Arc<AppState>| {
            redirect("/stocks/index", vec![clear_cookie(&state.session_cookie)])
        });

    let index = warp::path!("stocks" / "index")
        .and(get_or_post())
        .and(with_user(state.clone()))
        .and(with_cookies())
        .and(with_state(state.clone()))
        .map(index_page);

    let callback = callback_path(state.callback_route.clone())
        .and(warp::get())
        .and(warp::query::<CallbackParams>())
        .and(with_cookies())
        .and(with_state(state))
        .and_then(callback_handler);

    root.or(main_page)
        .or(add_stock)
        .or(remove_stock)
        .or(login)
        .or(register)
        .or(logout)
        .or(index)
        .or(callback)
        .recover(handle_rejection)
}

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn with_cookies() -> impl Filter<Extract = (Option<String>,), Error = Rejection> + Copy {
    warp::header::optional::<String>("cookie")
}

fn with_user(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Option<UserSession>,), Error = Rejection> + Clone {
    with_cookies().map(move |cookies: Option<String>| {
        cookie_value(cookies.as_deref(), &state.session_cookie)
            .and_then(|token| state.signer.verify_session(&token).ok())
    })
}

fn get_or_post() -> impl Filter<Extract = (), Error = Rejection> + Copy {
    warp::get().or(warp::post()).unify()
}

fn callback_path(route: String) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::path::full()
        .and_then(move |path: FullPath| {
            let matches = path.as_str() == route;
            async move {
                if matches {
                    Ok(())
                } else {
                    Err(warp::reject::not_found())
                }
            }
        })
        .untuple_one()
}

fn redirect(location: &str, cookies: Vec<String>) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::FOUND;
    if let Ok(value) = HeaderValue::from_str(location) {
        response.headers_mut().insert(LOCATION, value);
    }
    append_cookies(&mut response, cookies);
    response
}

fn append_cookies(response: &mut Response, cookies: Vec<String>) {
    for cookie in cookies {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => error!("Dropping malformed cookie: {}", e),
        }
    }
}

fn redirect_with_flashes(state: &AppState, location: &str, flashes: &[Flash]) -> Response {
    let cookies = match state.signer.create_flash_token(flashes) {
        Ok(token) => vec![set_cookie(FLASH_COOKIE, &token, state.cookie_secure)],
        Err(e) => {
            error!("Failed to sign flash messages: {}", e);
            Vec::new()
        }
    };
    redirect(location, cookies)
}

async fn main_page_handler(
    user: Option<UserSession>,
    cookies: Option<String>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    let user = match user {
        Some(user) => user,
        None => return Ok(redirect("/stocks/login", Vec::new())),
    };

    let holdings = state.store.list_for_user(&user.sub).await.map_err(|e| {
        error!("Failed to load portfolio for {}: {}", user.sub, e);
        warp::reject::custom(e)
    })?;
    let valuation = valuate(state.quotes.as_ref(), &holdings).await;
    let flashes = state
        .signer
        .read_flashes(cookie_value(cookies.as_deref(), FLASH_COOKIE).as_deref());
    let had_flashes = !flashes.is_empty();

    let page = PortfolioPage {
        user: UserView {
            sub: &user.sub,
            name: user.name.as_deref(),
            email: user.email.as_deref(),
        },
        holdings: holdings
            .iter()
            .zip(valuation.yields.iter())
            .map(|(holding, stock_yield)| HoldingRow {
                holding,
                stock_yield,
            })
            .collect(),
        total: valuation.total,
        flashes,
    };

    let mut response = warp::reply::json(&page).into_response();
    if had_flashes {
        append_cookies(&mut response, vec![clear_cookie(FLASH_COOKIE)]);
    }
    Ok(response)
}

async fn add_stock_handler(
    user: Option<UserSession>,
    form: AddStockForm,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    let user = match user {
        Some(user) => user,
        None => return Ok(redirect("/stocks/login", Vec::new())),
    };

    let catalog = match state.catalog.get() {
        Ok(catalog) => catalog,
        Err(e) => {
            error!("Ticker catalog unavailable: {}", e);
            let flash = Flash::danger(format!("Error validating stock symbol: {}", e));
            return Ok(redirect_with_flashes(&state, "/stocks/main", &[flash]));
        }
    };

    let stock = match form.validate(&catalog) {
        Ok(stock) => stock,
        Err(errors) => {
            let flashes: Vec<Flash> = errors.into_iter().map(Flash::danger).collect();
            return Ok(redirect_with_flashes(&state, "/stocks/main", &flashes));
        }
    };

    let holding = match Holding::new(
        &user.sub,
        &stock.stock_symbol,
        stock.num_of_shares,
        stock.purchase_price,
        &catalog,
    ) {
        Ok(holding) => holding,
        Err(e) => {
            return Ok(redirect_with_flashes(
                &state,
                "/stocks/main",
                &[Flash::danger(e.to_string())],
            ))
        }
    };

    let symbol = holding.stock_symbol.clone();
    let flash = match state.store.insert(holding).await {
        Ok(()) => {
            info!("{} added {} to their portfolio", user.sub, symbol);
            Flash::success(format!("{} stock was added successfully", symbol))
        }
        Err(e @ AppError::DuplicateHolding(_)) => Flash::warning(e.to_string()),
        Err(e) => {
            error!("Failed to add {} for {}: {}", symbol, user.sub, e);
            Flash::danger(format!("Error adding stock: {}", e))
        }
    };
    Ok(redirect_with_flashes(&state, "/stocks/main", &[flash]))
}

async fn remove_stock_handler(
    user: Option<UserSession>,
    form: RemoveStockForm,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    let user = match user {
        Some(user) => user,
        None => return Ok(redirect("/stocks/login", Vec::new())),
    };

    let flash = match state.store.remove(&user.sub, &form.stock_id).await {
        Ok(true) => {
            info!("{} removed holding {}", user.sub, form.stock_id);
            Flash::success("Stock removed successfully")
        }
        Ok(false) => {
            warn!("{} tried to remove holding {}", user.sub, form.stock_id);
            Flash::danger("Stock not found or you do not have permission to delete it")
        }
        Err(e) => {
            error!("Failed to remove holding {}: {}", form.stock_id, e);
            Flash::danger(format!("Error removing stock: {}", e))
        }
    };
    Ok(redirect_with_flashes(&state, "/stocks/main", &[flash]))
}

async fn login_handler(
    user: Option<UserSession>,
    state: Arc<AppState>,
    next: &'static str,
) -> Result<Response, Rejection> {
    if user.is_some() {
        return Ok(redirect(next, Vec::new()));
    }

    match start_login(&state, next) {
        Ok((token, url)) => Ok(redirect(
            &url,
            vec![set_cookie(STATE_COOKIE, &token, state.cookie_secure)],
        )),
        Err(e) => {
            error!("Could not start login: {}", e);
            Err(warp::reject::custom(e))
        }
    }
}

/// Returns the signed state cookie and the provider URL to send the user to.
fn start_login(state: &AppState, next: &str) -> Result<(String, String), AppError> {
    let nonce = Uuid::new_v4().simple().to_string();
    let token = state.signer.create_state_token(&nonce, next)?;
    let url = state.oidc.authorize_url(&nonce)?;
    Ok((token, url))
}

async fn callback_handler(
    params: CallbackParams,
    cookies: Option<String>,
    state: Arc<AppState>,
) -> Result<Response, Rejection> {
    match finish_login(&params, cookies.as_deref(), &state).await {
        Ok((session_token, next)) => Ok(redirect(
            &next,
            vec![
                set_cookie(&state.session_cookie, &session_token, state.cookie_secure),
                clear_cookie(STATE_COOKIE),
            ],
        )),
        Err(e) => {
            warn!("Login failed: {}", e);
            let mut response = redirect_with_flashes(
                &state,
                "/stocks/index",
                &[Flash::danger(format!("Login failed: {}", e))],
            );
            append_cookies(&mut response, vec![clear_cookie(STATE_COOKIE)]);
            Ok(response)
        }
    }
}

async fn finish_login(
    params: &CallbackParams,
    cookies: Option<&str>,
    state: &AppState,
) -> Result<(String, String), AppError> {
    if let Some(error) = &params.error {
        let detail = params.error_description.as_deref().unwrap_or(error);
        return Err(AppError::Auth(detail.to_string()));
    }

    let login_state = cookie_value(cookies, STATE_COOKIE)
        .ok_or_else(|| AppError::Auth("login session expired".into()))
        .and_then(|token| state.signer.verify_state(&token))?;
    if params.state.as_deref() != Some(login_state.state.as_str()) {
        return Err(AppError::Auth("state mismatch".into()));
    }
    let code = params
        .code
        .as_deref()
        .ok_or_else(|| AppError::Auth("missing authorization code".into()))?;

    let claims = state.oidc.exchange_code(code).await?;
    let token = state.signer.create_session_token(&claims)?;
    Ok((token, login_state.next))
}

fn index_page(
    user: Option<UserSession>,
    cookies: Option<String>,
    state: Arc<AppState>,
) -> Response {
    let flashes = state
        .signer
        .read_flashes(cookie_value(cookies.as_deref(), FLASH_COOKIE).as_deref());
    let had_flashes = !flashes.is_empty();
    let body = json!({
        "title": "Portfolio Tracker",
        "logged_in": user.is_some(),
        "user": user.as_ref().and_then(|u| u.name.clone().or_else(|| u.email.clone())),
        "links": {
            "portfolio": "/stocks/main",
            "login": "/stocks/login",
            "register": "/stocks/register",
            "logout": "/stocks/logout",
        },
        "flashes": flashes,
    });
    let mut response = warp::reply::json(&body).into_response();
    if had_flashes {
        append_cookies(&mut response, vec![clear_cookie(FLASH_COOKIE)]);
    }
    response
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<AppError>() {
        (e.status(), e.to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Form too large".to_string())
    } else if err.find::<warp::body::BodyDeserializeError>().is_some()
        || err.find::<warp::reject::InvalidQuery>().is_some()
    {
        (StatusCode::BAD_REQUEST, "Malformed request".to_string())
    } else {
        warn!("Unhandled rejection: {:?}", err);
        (StatusCode::BAD_REQUEST, "Bad request".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "error": message })),
        status,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Audience, ClientSecrets, IdClaims};
    use crate::catalog::sample_catalog;
    use crate::db::MemoryStore;
    use crate::quotes::stub::StubQuotes;
    use serde_json::Value;

    const SECRET: &str = "test-secret";

    fn state_with(store: Arc<MemoryStore>) -> Arc<AppState> {
        let secrets = ClientSecrets::from_json(
            r#"{"web": {
                "client_id": "portfolio",
                "client_secret": "s3cret",
                "auth_uri": "https://idp.example.com/authorize",
                "token_uri": "https://idp.example.com/token"
            }}"#,
        )
        .unwrap();
        Arc::new(AppState {
            store,
            quotes: Arc::new(StubQuotes::new(&[("AAPL", 200.0), ("MSFT", 300.0)])),
            catalog: Arc::new(CatalogCache::preloaded(sample_catalog())),
            signer: TokenSigner::new(SECRET),
            oidc: Arc::new(OidcClient::new(
                secrets,
                "http://localhost:8001/oidc/callback".into(),
                vec!["openid".into()],
                reqwest::Client::new(),
            )),
            session_cookie: "oidc_token".into(),
            cookie_secure: false,
            callback_route: "/oidc/callback".into(),
        })
    }

    fn session_cookie(sub: &str) -> String {
        let token = TokenSigner::new(SECRET)
            .create_session_token(&IdClaims {
                sub: sub.into(),
                iss: None,
                aud: Audience::One("portfolio".into()),
                exp: 0,
                email: None,
                name: Some(sub.to_uppercase()),
            })
            .unwrap();
        format!("oidc_token={}", token)
    }

    fn location(res: &warp::http::Response<warp::hyper::body::Bytes>) -> &str {
        res.headers().get(LOCATION).unwrap().to_str().unwrap()
    }

    fn set_cookie_value(
        res: &warp::http::Response<warp::hyper::body::Bytes>,
        name: &str,
    ) -> Option<String> {
        res.headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|c| {
                let pair = c.split(';').next()?;
                let (key, value) = pair.split_once('=')?;
                (key == name).then(|| value.to_string())
            })
    }

    fn flashes(res: &warp::http::Response<warp::hyper::body::Bytes>) -> Vec<Flash> {
        let token = set_cookie_value(res, FLASH_COOKIE).expect("flash cookie");
        TokenSigner::new(SECRET).read_flashes(Some(&token))
    }

    async fn add<F>(
        filter: &F,
        user: &str,
        body: &str,
    ) -> warp::http::Response<warp::hyper::body::Bytes>
    where
        F: Filter + 'static,
        F::Extract: Reply + Send,
    {
        warp::test::request()
            .method("POST")
            .path("/stocks/main")
            .header("cookie", session_cookie(user))
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body.to_string())
            .reply(filter)
            .await
    }

    #[tokio::test]
    async fn root_redirects_to_portfolio() {
        let api = routes(state_with(Arc::new(MemoryStore::new())));
        let res = warp::test::request().path("/").reply(&api).await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(location(&res), "/stocks/main");
    }

    #[tokio::test]
    async fn anonymous_users_are_sent_to_login() {
        let api = routes(state_with(Arc::new(MemoryStore::new())));
        let res = warp::test::request().path("/stocks/main").reply(&api).await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(location(&res), "/stocks/login");

        let res = warp::test::request()
            .method("POST")
            .path("/stocks/remove_stock")
            .header("content-type", "application/x-www-form-urlencoded")
            .body("stock_id=abc")
            .reply(&api)
            .await;
        assert_eq!(location(&res), "/stocks/login");
    }

    #[tokio::test]
    async fn login_starts_oidc_flow() {
        let api = routes(state_with(Arc::new(MemoryStore::new())));
        let res = warp::test::request().path("/stocks/login").reply(&api).await;

        assert_eq!(res.status(), StatusCode::FOUND);
        assert!(location(&res).starts_with("https://idp.example.com/authorize?response_type=code"));
        let state_token = set_cookie_value(&res, STATE_COOKIE).unwrap();
        let login_state = TokenSigner::new(SECRET).verify_state(&state_token).unwrap();
        assert_eq!(login_state.next, "/stocks/main");
        assert!(location(&res).contains(&format!("state={}", login_state.state)));
    }

    #[tokio::test]
    async fn logged_in_login_goes_to_portfolio() {
        let api = routes(state_with(Arc::new(MemoryStore::new())));
        let res = warp::test::request()
            .path("/stocks/login")
            .header("cookie", session_cookie("alice"))
            .reply(&api)
            .await;
        assert_eq!(location(&res), "/stocks/main");

        let res = warp::test::request()
            .method("POST")
            .path("/stocks/register")
            .header("cookie", session_cookie("alice"))
            .reply(&api)
            .await;
        assert_eq!(location(&res), "/stocks/index");
    }

    #[tokio::test]
    async fn add_then_view_portfolio() {
        let store = Arc::new(MemoryStore::new());
        let api = routes(state_with(store.clone()));

        let res = add(&api, "alice", "stock_symbol=aapl&purchase_price=150&num_of_shares=2").await;
        assert_eq!(location(&res), "/stocks/main");
        assert_eq!(
            flashes(&res),
            vec![Flash::success("AAPL stock was added successfully")]
        );
        let flash_token = set_cookie_value(&res, FLASH_COOKIE).unwrap();

        let res = warp::test::request()
            .path("/stocks/main")
            .header(
                "cookie",
                format!("{}; flash={}", session_cookie("alice"), flash_token),
            )
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(set_cookie_value(&res, FLASH_COOKIE).is_some());

        let page: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(page["user"]["sub"], "alice");
        assert_eq!(page["holdings"][0]["stock_symbol"], "AAPL");
        assert_eq!(page["holdings"][0]["net_buy_price"], 300.0);
        assert_eq!(page["holdings"][0]["yield"]["profit_in_usd"], 100.0);
        assert_eq!(page["total"]["value"], 400.0);
        assert_eq!(page["flashes"][0]["level"], "alert-success");
    }

    #[tokio::test]
    async fn duplicate_add_is_a_warning() {
        let store = Arc::new(MemoryStore::new());
        let api = routes(state_with(store.clone()));

        add(&api, "alice", "stock_symbol=MSFT&purchase_price=10&num_of_shares=1").await;
        let res = add(&api, "alice", "stock_symbol=msft&purchase_price=12&num_of_shares=3").await;

        assert_eq!(
            flashes(&res),
            vec![Flash::warning("MSFT is already in your portfolio")]
        );
        let held = store.list_for_user("alice").await.unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].purchase_price, 10.0);
    }

    #[tokio::test]
    async fn invalid_form_flashes_each_error() {
        let store = Arc::new(MemoryStore::new());
        let api = routes(state_with(store.clone()));

        let res = add(&api, "alice", "stock_symbol=ZZZZ&purchase_price=abc&num_of_shares=0").await;
        let messages: Vec<String> = flashes(&res).into_iter().map(|f| f.message).collect();
        assert_eq!(
            messages,
            vec![
                "Stock \"ZZZZ\" was not found",
                "Please enter numbers only",
                "Please enter a positive number",
            ]
        );
        assert!(store.list_for_user("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn only_owner_can_remove() {
        let store = Arc::new(MemoryStore::new());
        let api = routes(state_with(store.clone()));
        add(&api, "alice", "stock_symbol=AAPL&purchase_price=150&num_of_shares=2").await;
        let id = store.list_for_user("alice").await.unwrap()[0].id.clone();

        let remove = |user: &str| {
            warp::test::request()
                .method("POST")
                .path("/stocks/remove_stock")
                .header("cookie", session_cookie(user))
                .header("content-type", "application/x-www-form-urlencoded")
                .body(format!("stock_id={}", id))
        };

        let res = remove("mallory").reply(&api).await;
        assert_eq!(
            flashes(&res),
            vec![Flash::danger(
                "Stock not found or you do not have permission to delete it"
            )]
        );
        assert_eq!(store.list_for_user("alice").await.unwrap().len(), 1);

        let res = remove("alice").reply(&api).await;
        assert_eq!(flashes(&res), vec![Flash::success("Stock removed successfully")]);
        assert!(store.list_for_user("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unpriced_holdings_still_count_quantity() {
        let store = Arc::new(MemoryStore::new());
        let api = routes(state_with(store.clone()));
        add(&api, "alice", "stock_symbol=AAPL&purchase_price=150&num_of_shares=2").await;
        add(&api, "alice", "stock_symbol=NVDA&purchase_price=51&num_of_shares=4").await;

        let res = warp::test::request()
            .path("/stocks/main")
            .header("cookie", session_cookie("alice"))
            .reply(&api)
            .await;
        let page: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(page["holdings"][1]["yield"]["error"], true);
        assert!(page["holdings"][1]["yield"]["total_value"].is_null());
        assert_eq!(page["total"]["quantity"], 6.0);
        assert_eq!(page["total"]["value"], 400.0);
    }

    #[tokio::test]
    async fn callback_rejects_state_mismatch() {
        let api = routes(state_with(Arc::new(MemoryStore::new())));
        let state_token = TokenSigner::new(SECRET)
            .create_state_token("expected", "/stocks/main")
            .unwrap();

        let res = warp::test::request()
            .path("/oidc/callback?code=abc&state=forged")
            .header("cookie", format!("oidc_state={}", state_token))
            .reply(&api)
            .await;

        assert_eq!(location(&res), "/stocks/index");
        assert!(set_cookie_value(&res, "oidc_token").is_none());
        assert_eq!(
            flashes(&res),
            vec![Flash::danger("Login failed: Authentication failed: state mismatch")]
        );
    }

    #[tokio::test]
    async fn callback_reports_provider_error() {
        let api = routes(state_with(Arc::new(MemoryStore::new())));
        let res = warp::test::request()
            .path("/oidc/callback?error=access_denied&error_description=User%20cancelled")
            .reply(&api)
            .await;
        assert_eq!(
            flashes(&res),
            vec![Flash::danger("Login failed: Authentication failed: User cancelled")]
        );
    }

    #[tokio::test]
    async fn logout_clears_session() {
        let api = routes(state_with(Arc::new(MemoryStore::new())));
        let res = warp::test::request()
            .path("/stocks/logout")
            .header("cookie", session_cookie("alice"))
            .reply(&api)
            .await;
        assert_eq!(location(&res), "/stocks/index");
        assert_eq!(set_cookie_value(&res, "oidc_token").as_deref(), Some(""));
    }

    #[tokio::test]
    async fn index_reports_login_state() {
        let api = routes(state_with(Arc::new(MemoryStore::new())));
        let res = warp::test::request().path("/stocks/index").reply(&api).await;
        let page: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(page["logged_in"], false);

        let res = warp::test::request()
            .path("/stocks/index")
            .header("cookie", session_cookie("alice"))
            .reply(&api)
            .await;
        let page: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(page["logged_in"], true);
        assert_eq!(page["user"], "ALICE");
        assert!(set_cookie_value(&res, FLASH_COOKIE).is_none());
    }

    #[tokio::test]
    async fn index_shows_and_clears_login_failure() {
        let api = routes(state_with(Arc::new(MemoryStore::new())));
        let res = warp::test::request()
            .path("/oidc/callback?error=access_denied&error_description=User%20cancelled")
            .reply(&api)
            .await;
        assert_eq!(location(&res), "/stocks/index");
        let flash_token = set_cookie_value(&res, FLASH_COOKIE).unwrap();

        let res = warp::test::request()
            .path("/stocks/index")
            .header("cookie", format!("flash={}", flash_token))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(set_cookie_value(&res, FLASH_COOKIE).as_deref(), Some(""));

        let page: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(
            page["flashes"][0]["message"],
            "Login failed: Authentication failed: User cancelled"
        );
        assert_eq!(page["flashes"][0]["level"], "alert-danger");
    }

    #[tokio::test]
    async fn remove_without_stock_id() {
        let store = Arc::new(MemoryStore::new());
        let api = routes(state_with(store.clone()));
        let remove = || {
            warp::test::request()
                .method("POST")
                .path("/stocks/remove_stock")
                .header("content-type", "application/x-www-form-urlencoded")
                .body("")
        };

        let res = remove().reply(&api).await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(location(&res), "/stocks/login");

        let res = remove()
            .header("cookie", session_cookie("alice"))
            .reply(&api)
            .await;
        assert_eq!(location(&res), "/stocks/main");
        assert_eq!(
            flashes(&res),
            vec![Flash::danger(
                "Stock not found or you do not have permission to delete it"
            )]
        );
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let api = routes(state_with(Arc::new(MemoryStore::new())));
        let res = warp::test::request().path("/nope").reply(&api).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
