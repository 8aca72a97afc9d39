use cookie::{Cookie, SameSite};
use time::OffsetDateTime;
use tower_cookies::Cookies;

use crate::authentication::TokenPair;
use crate::config::AppConfig;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

fn base_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_secure(secure);
    // Browsers drop SameSite=None cookies that are not Secure
    cookie.set_same_site(if secure { SameSite::None } else { SameSite::Lax });
    cookie
}

fn expiry_from_now(lifetime: std::time::Duration) -> OffsetDateTime {
    let lifetime = time::Duration::try_from(lifetime).unwrap_or(time::Duration::days(1));
    OffsetDateTime::now_utc() + lifetime
}

pub fn setup_auth_cookies(tokens: &TokenPair, config: &AppConfig, cookies: &Cookies) {
    let mut access = base_cookie(
        ACCESS_TOKEN_COOKIE,
        tokens.access_token.clone(),
        config.cookie_secure,
    );
    access.set_expires(expiry_from_now(config.access_token.expiry));

    let mut refresh = base_cookie(
        REFRESH_TOKEN_COOKIE,
        tokens.refresh_token.clone(),
        config.cookie_secure,
    );
    refresh.set_expires(expiry_from_now(config.refresh_token.expiry));

    cookies.add(access);
    cookies.add(refresh);
}

pub fn clear_auth_cookies(config: &AppConfig, cookies: &Cookies) {
    for name in [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE] {
        let mut cookie = base_cookie(name, String::new(), config.cookie_secure);
        cookie.make_removal();
        cookies.remove(cookie);
    }
}
