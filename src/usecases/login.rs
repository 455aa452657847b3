use std::{io, path::Path};

use serde_json::Value;

use crate::{
    domain::{contact::normalize_current_user, message::Participant},
    infra::session_store::{self, StoredSession},
};

pub const LOGIN_ATTEMPTS: usize = 3;

const TOKEN_COOKIE: &str = "token";

/// Backend answer to a credentials check.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginResponse {
    pub body: Value,
    pub cookie: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginSourceError {
    Unavailable,
    InvalidData,
}

pub trait LoginSource {
    fn login(&self, email: &str, password: &str) -> Result<LoginResponse, LoginSourceError>;
}

impl<T: LoginSource + ?Sized> LoginSource for &T {
    fn login(&self, email: &str, password: &str) -> Result<LoginResponse, LoginSourceError> {
        (*self).login(email, password)
    }
}

pub trait LoginTerminal {
    fn print_line(&mut self, line: &str) -> io::Result<()>;
    fn prompt_line(&mut self, prompt: &str) -> io::Result<Option<String>>;
    fn prompt_secret(&mut self, prompt: &str) -> io::Result<Option<String>>;
}

pub struct StdTerminal;

impl LoginTerminal for StdTerminal {
    fn print_line(&mut self, line: &str) -> io::Result<()> {
        println!("{line}");
        Ok(())
    }

    fn prompt_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        use std::io::Write;

        print!("{prompt}");
        io::stdout().flush()?;

        let mut line = String::new();
        let bytes = io::stdin().read_line(&mut line)?;
        if bytes == 0 {
            return Ok(None);
        }

        Ok(Some(line.trim().to_owned()))
    }

    fn prompt_secret(&mut self, prompt: &str) -> io::Result<Option<String>> {
        match rpassword::prompt_password(prompt) {
            Ok(password) => Ok(Some(password)),
            Err(source) if source.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(source) => Err(source),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    SignedIn(Participant),
    ExitWithGuidance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginError {
    /// Credentials refused; carries the backend's message when it sent one.
    Rejected(String),
    /// Accepted, but nothing came back that could authenticate later requests.
    MissingSession,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedInSession {
    pub user: Participant,
    pub cookie: String,
}

/// Reads `{ success, user, message }` and picks the session cookie.
///
/// Backends that return the token in the body instead of a cookie get it
/// wrapped as `token=<value>`.
pub fn accept_login(response: &LoginResponse) -> Result<SignedInSession, LoginError> {
    let body = &response.body;
    let succeeded = body.get("success").and_then(Value::as_bool).unwrap_or(false);
    let user = body
        .get("user")
        .filter(|user| !user.is_null())
        .and_then(|_| normalize_current_user(body));

    let Some(user) = user.filter(|_| succeeded) else {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .filter(|message| !message.trim().is_empty())
            .unwrap_or("Invalid email or password.");
        return Err(LoginError::Rejected(message.to_owned()));
    };

    let cookie = response
        .cookie
        .clone()
        .filter(|cookie| !cookie.trim().is_empty())
        .or_else(|| {
            body.get("token")
                .and_then(Value::as_str)
                .filter(|token| !token.is_empty())
                .map(|token| format!("{TOKEN_COOKIE}={token}"))
        })
        .ok_or(LoginError::MissingSession)?;

    Ok(SignedInSession { user, cookie })
}

pub fn run_login(
    terminal: &mut dyn LoginTerminal,
    source: &dyn LoginSource,
    email: Option<&str>,
    session_path: &Path,
    attempts: usize,
) -> io::Result<LoginOutcome> {
    for attempt in 1..=attempts {
        let attempts_left = attempts.saturating_sub(attempt);

        let email = match email {
            Some(email) => email.trim().to_owned(),
            None => {
                let Some(email) = terminal.prompt_line("Email: ")? else {
                    return cancelled(terminal);
                };
                email
            }
        };
        if !is_plausible_email(&email) {
            terminal.print_line(&format!(
                "LOGIN_INVALID_EMAIL: {email:?} is not an email address. Attempts left: {attempts_left}"
            ))?;
            continue;
        }

        let Some(password) = terminal.prompt_secret("Password: ")? else {
            return cancelled(terminal);
        };
        if password.is_empty() {
            terminal.print_line(&format!(
                "Password cannot be empty. Attempts left: {attempts_left}"
            ))?;
            continue;
        }

        let response = match source.login(&email, &password) {
            Ok(response) => response,
            Err(LoginSourceError::Unavailable) => {
                terminal.print_line(&format!(
                    "LOGIN_UNAVAILABLE: could not reach the marketplace backend. Attempts left: {attempts_left}"
                ))?;
                continue;
            }
            Err(LoginSourceError::InvalidData) => {
                terminal.print_line("LOGIN_INVALID_RESPONSE: the backend answered with an unreadable body.")?;
                return Ok(LoginOutcome::ExitWithGuidance);
            }
        };

        match accept_login(&response) {
            Ok(session) => return persist(terminal, session, session_path),
            Err(LoginError::Rejected(message)) => {
                terminal.print_line(&format!(
                    "LOGIN_REJECTED: {message} Attempts left: {attempts_left}"
                ))?;
            }
            Err(LoginError::MissingSession) => {
                terminal.print_line(
                    "LOGIN_NO_SESSION: signed in, but the backend returned no session cookie.",
                )?;
                return Ok(LoginOutcome::ExitWithGuidance);
            }
        }
    }

    terminal.print_line("Login failed too many times. Run dmchat login again later.")?;
    Ok(LoginOutcome::ExitWithGuidance)
}

fn persist(
    terminal: &mut dyn LoginTerminal,
    session: SignedInSession,
    session_path: &Path,
) -> io::Result<LoginOutcome> {
    let stored = StoredSession {
        cookie: session.cookie,
        user_id: Some(session.user.id.clone()),
        user_name: session.user.name.clone(),
    };
    session_store::save(session_path, &stored).map_err(io::Error::other)?;

    terminal.print_line(&format!(
        "Signed in as {}. Session saved to {}.",
        session.user.display_name(),
        session_path.display()
    ))?;
    Ok(LoginOutcome::SignedIn(session.user))
}

fn cancelled(terminal: &mut dyn LoginTerminal) -> io::Result<LoginOutcome> {
    terminal.print_line("Input cancelled (EOF). Run dmchat login again to retry.")?;
    Ok(LoginOutcome::ExitWithGuidance)
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !email.contains(' '),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::VecDeque};

    use serde_json::json;

    use super::*;

    struct FakeTerminal {
        inputs: VecDeque<Option<String>>,
        output: Vec<String>,
    }

    impl FakeTerminal {
        fn new(inputs: Vec<Option<&str>>) -> Self {
            Self {
                inputs: inputs
                    .into_iter()
                    .map(|item| item.map(|value| value.to_owned()))
                    .collect(),
                output: Vec::new(),
            }
        }
    }

    impl LoginTerminal for FakeTerminal {
        fn print_line(&mut self, line: &str) -> io::Result<()> {
            self.output.push(line.to_owned());
            Ok(())
        }

        fn prompt_line(&mut self, _prompt: &str) -> io::Result<Option<String>> {
            Ok(self.inputs.pop_front().flatten())
        }

        fn prompt_secret(&mut self, _prompt: &str) -> io::Result<Option<String>> {
            Ok(self.inputs.pop_front().flatten())
        }
    }

    struct FakeSource {
        replies: RefCell<VecDeque<Result<LoginResponse, LoginSourceError>>>,
        calls: RefCell<Vec<(String, String)>>,
    }

    impl FakeSource {
        fn new(replies: Vec<Result<LoginResponse, LoginSourceError>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl LoginSource for FakeSource {
        fn login(&self, email: &str, password: &str) -> Result<LoginResponse, LoginSourceError> {
            self.calls
                .borrow_mut()
                .push((email.to_owned(), password.to_owned()));
            self.replies
                .borrow_mut()
                .pop_front()
                .expect("missing login reply")
        }
    }

    fn accepted(cookie: Option<&str>) -> LoginResponse {
        LoginResponse {
            body: json!({ "success": true, "user": { "_id": "me01", "name": "Ada" } }),
            cookie: cookie.map(ToOwned::to_owned),
        }
    }

    fn refused() -> LoginResponse {
        LoginResponse {
            body: json!({ "success": false, "message": "Invalid credentials." }),
            cookie: None,
        }
    }

    #[test]
    fn accepts_cookie_set_by_backend() {
        let session = accept_login(&accepted(Some("token=abc"))).expect("must sign in");

        assert_eq!(session.cookie, "token=abc");
        assert_eq!(session.user.id, "me01");
    }

    #[test]
    fn falls_back_to_token_in_body() {
        let response = LoginResponse {
            body: json!({ "success": true, "user": { "_id": "me01" }, "token": "jwt" }),
            cookie: None,
        };

        let session = accept_login(&response).expect("must sign in");

        assert_eq!(session.cookie, "token=jwt");
    }

    #[test]
    fn success_without_user_is_rejected() {
        let response = LoginResponse {
            body: json!({ "success": true, "user": null }),
            cookie: Some("token=abc".to_owned()),
        };

        assert_eq!(
            accept_login(&response),
            Err(LoginError::Rejected("Invalid email or password.".to_owned()))
        );
        assert_eq!(accept_login(&accepted(None)), Err(LoginError::MissingSession));
    }

    #[test]
    fn login_saves_session_after_a_refused_attempt() {
        let temp_dir = tempfile::tempdir().expect("must create temp dir");
        let session_path = temp_dir.path().join("session.toml");
        let mut terminal = FakeTerminal::new(vec![Some("wrong"), Some("s3cret")]);
        let source = FakeSource::new(vec![Ok(refused()), Ok(accepted(Some("token=abc")))]);

        let outcome = run_login(
            &mut terminal,
            &source,
            Some("ada@example.com"),
            &session_path,
            LOGIN_ATTEMPTS,
        )
        .expect("login must run");

        assert!(matches!(outcome, LoginOutcome::SignedIn(user) if user.id == "me01"));
        assert!(terminal
            .output
            .iter()
            .any(|line| line.contains("Invalid credentials.")));
        assert_eq!(source.calls.borrow()[1].1, "s3cret");

        let stored = session_store::load(&session_path)
            .expect("must load")
            .expect("session must exist");
        assert_eq!(stored.cookie, "token=abc");
        assert_eq!(stored.user_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn invalid_email_is_reprompted_without_calling_backend() {
        let temp_dir = tempfile::tempdir().expect("must create temp dir");
        let session_path = temp_dir.path().join("session.toml");
        let mut terminal =
            FakeTerminal::new(vec![Some("ada"), Some("ada@example.com"), Some("pw")]);
        let source = FakeSource::new(vec![Ok(accepted(Some("token=abc")))]);

        let outcome = run_login(&mut terminal, &source, None, &session_path, LOGIN_ATTEMPTS)
            .expect("login must run");

        assert!(matches!(outcome, LoginOutcome::SignedIn(_)));
        assert_eq!(source.calls.borrow().len(), 1);
        assert_eq!(source.calls.borrow()[0].0, "ada@example.com");
    }

    #[test]
    fn eof_exits_with_guidance_and_saves_nothing() {
        let temp_dir = tempfile::tempdir().expect("must create temp dir");
        let session_path = temp_dir.path().join("session.toml");
        let mut terminal = FakeTerminal::new(vec![None]);
        let source = FakeSource::new(Vec::new());

        let outcome = run_login(&mut terminal, &source, None, &session_path, LOGIN_ATTEMPTS)
            .expect("login must run");

        assert_eq!(outcome, LoginOutcome::ExitWithGuidance);
        assert!(!session_path.exists());
        assert!(terminal.output.iter().any(|line| line.contains("EOF")));
    }

    #[test]
    fn gives_up_after_all_attempts_are_refused() {
        let temp_dir = tempfile::tempdir().expect("must create temp dir");
        let session_path = temp_dir.path().join("session.toml");
        let mut terminal = FakeTerminal::new(vec![Some("a"), Some("b")]);
        let source = FakeSource::new(vec![Ok(refused()), Err(LoginSourceError::Unavailable)]);

        let outcome = run_login(
            &mut terminal,
            &source,
            Some("ada@example.com"),
            &session_path,
            2,
        )
        .expect("login must run");

        assert_eq!(outcome, LoginOutcome::ExitWithGuidance);
        assert!(terminal
            .output
            .last()
            .is_some_and(|line| line.contains("too many times")));
    }
}
