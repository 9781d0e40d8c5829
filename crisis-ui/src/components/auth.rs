use crate::bridge;
use crisis_core::backend;
use crisis_core::{BackendError, HostedClient, Session, SignUpOutcome};
use leptos::*;
use wasm_bindgen_futures::spawn_local;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Password,
    Code,
    SignUp,
}

impl Mode {
    fn title(self) -> &'static str {
        match self {
            Mode::Password => "Sign in",
            Mode::Code => "Sign in with a code",
            Mode::SignUp => "Create account",
        }
    }
}

#[component]
pub fn Auth(#[prop(into)] on_signed_in: Callback<Session>) -> impl IntoView {
    let client = store_value(expect_context::<HostedClient>());
    let mode = create_rw_signal(Mode::Password);
    let email = create_rw_signal(String::new());
    let password = create_rw_signal(String::new());
    let code = create_rw_signal(String::new());
    let code_sent = create_rw_signal(false);
    let busy = create_rw_signal(false);
    let error = create_rw_signal(None::<String>);
    let notice = create_rw_signal(None::<String>);

    let finish = move |result: Result<Session, BackendError>| {
        busy.set(false);
        match result {
            Ok(session) => {
                bridge::persist_session(&client.get_value());
                on_signed_in.call(session);
            }
            Err(err) => error.set(Some(err.to_string())),
        }
    };

    let switch_mode = move |next: Mode| {
        mode.set(next);
        code_sent.set(false);
        error.set(None);
        notice.set(None);
    };

    let submit = move |ev: ev::SubmitEvent| {
        ev.prevent_default();
        error.set(None);
        notice.set(None);
        busy.set(true);

        let client = client.get_value();
        let email_value = email.get_untracked();
        let password_value = password.get_untracked();
        let code_value = code.get_untracked();
        spawn_local(async move {
            match mode.get_untracked() {
                Mode::Password => finish(backend::sign_in(&client, &email_value, &password_value).await),
                Mode::Code if !code_sent.get_untracked() => {
                    match backend::request_code(&client, &email_value).await {
                        Ok(sent_to) => {
                            code_sent.set(true);
                            notice.set(Some(format!("We sent a 6-digit code to {sent_to}.")));
                        }
                        Err(err) => error.set(Some(err.to_string())),
                    }
                    busy.set(false);
                }
                Mode::Code => finish(backend::sign_in_with_code(&client, &email_value, &code_value).await),
                Mode::SignUp => match backend::register(&client, &email_value, &password_value).await {
                    Ok(SignUpOutcome::SignedIn(session)) => finish(Ok(session)),
                    Ok(SignUpOutcome::ConfirmationRequired) => {
                        busy.set(false);
                        notice.set(Some("Check your email to confirm your account, then sign in.".into()));
                        mode.set(Mode::Password);
                    }
                    Err(err) => finish(Err(err)),
                },
            }
        });
    };

    let submit_label = move || match (mode.get(), code_sent.get()) {
        (Mode::Password, _) => "Sign in",
        (Mode::Code, false) => "Send code",
        (Mode::Code, true) => "Verify code",
        (Mode::SignUp, _) => "Sign up",
    };

    view! {
      <section class="panel auth">
        <h2>{move || mode.get().title()}</h2>
        <form class="stack" on:submit=submit>
          <input
            type="email"
            placeholder="Email"
            prop:value=move || email.get()
            on:input=move |ev| email.set(event_target_value(&ev))
          />
          <Show when=move || mode.get() != Mode::Code>
            <input
              type="password"
              placeholder="Password"
              prop:value=move || password.get()
              on:input=move |ev| password.set(event_target_value(&ev))
            />
          </Show>
          <Show when=move || mode.get() == Mode::Code && code_sent.get()>
            <input
              inputmode="numeric"
              placeholder="6-digit code"
              prop:value=move || code.get()
              on:input=move |ev| code.set(event_target_value(&ev))
            />
          </Show>
          <button type="submit" disabled=move || busy.get()>{submit_label}</button>
        </form>

        <div class="row">
          <Show when=move || mode.get() != Mode::Password>
            <button on:click=move |_| switch_mode(Mode::Password)>"Use password"</button>
          </Show>
          <Show when=move || mode.get() != Mode::Code>
            <button on:click=move |_| switch_mode(Mode::Code)>"Email me a code"</button>
          </Show>
          <Show when=move || mode.get() != Mode::SignUp>
            <button on:click=move |_| switch_mode(Mode::SignUp)>"Create account"</button>
          </Show>
        </div>

        <Show when=move || notice.get().is_some()>
          <p class="meta">{move || notice.get().unwrap_or_default()}</p>
        </Show>
        <Show when=move || error.get().is_some()>
          <p class="error">{move || error.get().unwrap_or_default()}</p>
        </Show>
      </section>
    }
}
