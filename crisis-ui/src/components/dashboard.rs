use chrono::Utc;
use crisis_core::views::{self, LoadState};
use crisis_core::{Activity, ActivityQuery, CrisisBackend, CrisisSummary, HostedClient};
use leptos::*;
use wasm_bindgen_futures::spawn_local;

#[component]
pub fn Dashboard() -> impl IntoView {
    let client = store_value(expect_context::<HostedClient>());
    let crisis = create_rw_signal(LoadState::<Option<CrisisSummary>>::Loading);
    let activities = create_rw_signal(LoadState::<Vec<Activity>>::Loading);

    let load_crisis = move || {
        crisis.set(LoadState::Loading);
        spawn_local(async move {
            let result = client.get_value().current_crisis().await;
            crisis.set(LoadState::from_result(result, views::CRISIS_LOAD_FAILED));
        });
    };

    // The feed covers every crisis, not just the current one.
    let load_activities = move || {
        activities.set(LoadState::Loading);
        spawn_local(async move {
            let query = ActivityQuery::with_limit(views::DASHBOARD_ACTIVITY_LIMIT);
            let result = client.get_value().activity_log(&query).await;
            activities.set(LoadState::from_result(result, views::ACTIVITY_LOAD_FAILED));
        });
    };

    load_crisis();
    load_activities();

    view! {
      <section class="panel">
        <h2>"Current Crisis"</h2>
        {move || match crisis.get() {
          LoadState::Loading => view! { <p class="meta">"Loading..."</p> }.into_view(),
          LoadState::Failed(message) => view! {
            <p class="error">{message}</p>
            <button on:click=move |_| load_crisis()>"Try again"</button>
          }.into_view(),
          LoadState::Ready(None) => view! { <p class="meta">{views::NO_ACTIVE_CRISIS}</p> }.into_view(),
          LoadState::Ready(Some(c)) => {
            let tone = views::status_tone(&c.status);
            view! {
              <div>
                <h3>{c.name.clone()}</h3>
                <span class=tone.css_class()>{c.status.label()}</span>
                <div class="meta">{format!("Started {}", views::full_timestamp(c.start_time))}</div>
                <div class="meta">{format!("Duration {}", views::format_interval(&c.duration))}</div>
              </div>
            }.into_view()
          }
        }}
      </section>

      <section class="panel">
        <h2>"Activity Log"</h2>
        {move || match activities.get() {
          LoadState::Loading => view! { <p class="meta">"Loading..."</p> }.into_view(),
          LoadState::Failed(message) => view! {
            <p class="error">{message}</p>
            <button on:click=move |_| load_activities()>"Try again"</button>
          }.into_view(),
          LoadState::Ready(rows) if rows.is_empty() => view! { <p class="meta">{views::NO_ACTIVITIES}</p> }.into_view(),
          LoadState::Ready(rows) => {
            let now = Utc::now();
            view! {
              <ul>
                {rows
                  .into_iter()
                  .map(|a| view! {
                    <li>
                      <div>{a.description}</div>
                      <div class="meta" title=views::full_timestamp(a.timestamp)>
                        {views::relative_time(a.timestamp, now)}
                      </div>
                    </li>
                  })
                  .collect_view()}
              </ul>
            }.into_view()
          }
        }}
      </section>
    }
}
