use crate::bridge;
use crate::components::auth::Auth;
use crate::components::bob::BobBoardView;
use crate::components::dashboard::Dashboard;
use crate::components::reference::{Documents, ResponsibilityCards};
use crisis_core::views::Page;
use crisis_core::Session;
use leptos::*;
use wasm_bindgen_futures::spawn_local;

fn initial_page() -> Page {
    web_sys::window()
        .and_then(|w| w.location().pathname().ok())
        .and_then(|path| Page::from_path(&path))
        .unwrap_or_default()
}

#[component]
pub fn App() -> impl IntoView {
    let client = match bridge::connect() {
        Ok(client) => client,
        Err(message) => {
            logging::error!("{message}");
            return view! { <div class="panel error">{message}</div> }.into_view();
        }
    };
    provide_context(client.clone());

    let session = create_rw_signal(client.session());
    let checking = create_rw_signal(client.session().is_some());
    let page = create_rw_signal(initial_page());
    let client = store_value(client);

    spawn_local(async move {
        let restored = bridge::restore_session(&client.get_value()).await;
        session.set(restored);
        checking.set(false);
    });

    let on_signed_in = Callback::new(move |signed_in: Session| {
        page.set(Page::Dashboard);
        session.set(Some(signed_in));
    });

    let sign_out = move |_| {
        spawn_local(async move {
            bridge::sign_out(&client.get_value()).await;
            session.set(None);
        });
    };

    let user_role = Signal::derive(move || {
        session.with(|s| s.as_ref().and_then(|s| s.user.metadata_str("role")))
    });
    let email = move || {
        session.with(|s| {
            s.as_ref()
                .and_then(|s| s.user.email.clone())
                .unwrap_or_default()
        })
    };

    view! {
      <Show
        when=move || !checking.get()
        fallback=|| view! { <p class="meta">"Loading..."</p> }
      >
        <Show
          when=move || session.with(Option::is_some)
          fallback=move || view! { <Auth on_signed_in=on_signed_in/> }
        >
          <nav>
            {Page::ALL
              .into_iter()
              .map(|p| view! {
                <button
                  class=move || if page.get() == p { "active" } else { "" }
                  on:click=move |_| page.set(p)
                >
                  {p.title()}
                </button>
              })
              .collect_view()}
            <span class="spacer"></span>
            <span class="meta">{email}</span>
            <button on:click=sign_out>"Sign out"</button>
          </nav>
          <main>
            {move || match page.get() {
              Page::Dashboard => view! { <Dashboard/> }.into_view(),
              Page::Bob => view! { <BobBoardView/> }.into_view(),
              Page::ResponsibilityCards => view! { <ResponsibilityCards user_role=user_role/> }.into_view(),
              Page::Documents => view! { <Documents/> }.into_view(),
            }}
          </main>
        </Show>
      </Show>
    }
    .into_view()
}
