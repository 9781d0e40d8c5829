use crisis_core::views::{self, DocumentGroup, LoadState};
use crisis_core::{CrisisBackend, HostedClient, ResponsibilityCard};
use leptos::*;
use wasm_bindgen_futures::spawn_local;

#[component]
pub fn ResponsibilityCards(#[prop(into)] user_role: Signal<Option<String>>) -> impl IntoView {
    let client = store_value(expect_context::<HostedClient>());
    let cards = create_rw_signal(LoadState::<Vec<ResponsibilityCard>>::Loading);

    let load = move || {
        cards.set(LoadState::Loading);
        spawn_local(async move {
            let state = match client.get_value().responsibility_cards().await {
                Ok(rows) => LoadState::Ready(rows),
                Err(err) => LoadState::Failed(err.to_string()),
            };
            cards.set(state);
        });
    };

    load();

    view! {
      <section class="panel">
        <h2>"Responsibility Cards"</h2>
        {move || match cards.get() {
          LoadState::Loading => view! { <p class="meta">"Loading..."</p> }.into_view(),
          LoadState::Failed(message) => view! {
            <p class="error">{message}</p>
            <button on:click=move |_| load()>"Try again"</button>
          }.into_view(),
          LoadState::Ready(rows) if rows.is_empty() => view! {
            <p class="meta">"No responsibility cards yet."</p>
          }.into_view(),
          LoadState::Ready(rows) => {
            let role = user_role.get();
            rows
              .into_iter()
              .map(|card| {
                let yours = views::is_current_user_role(&card, role.as_deref());
                view! {
                  <div class=if yours { "card yours" } else { "card" }>
                    <div class="row">
                      <h3>{card.role.clone()}</h3>
                      {yours.then(|| view! { <span class="badge badge-danger">"Your Role"</span> })}
                    </div>
                    {card.description.clone().map(|d| view! { <p class="meta">{d}</p> })}
                    <ul>
                      {card.duties.into_iter().map(|duty| view! { <li>{duty}</li> }).collect_view()}
                    </ul>
                  </div>
                }
              })
              .collect_view()
          }
        }}
      </section>
    }
}

fn document_group_view(group: DocumentGroup) -> impl IntoView {
    view! {
      <div>
        <h3>
          {group.label}
          " "
          <span class="meta">{views::document_count(group.documents.len())}</span>
        </h3>
        {group
          .documents
          .into_iter()
          .map(|doc| {
            let updated = doc
              .was_updated()
              .then(|| format!(" · updated {}", views::calendar_date(doc.updated_at)));
            view! {
              <div class="card">
                {match doc.file_url {
                  Some(url) => view! { <a href=url target="_blank">{doc.title}</a> }.into_view(),
                  None => view! { <b>{doc.title}</b> }.into_view(),
                }}
                {doc.description.map(|d| view! { <p class="meta">{d}</p> })}
                <div class="meta">
                  {format!("Added {}", views::calendar_date(doc.created_at))}
                  {updated}
                </div>
              </div>
            }
          })
          .collect_view()}
      </div>
    }
}

#[component]
pub fn Documents() -> impl IntoView {
    let client = store_value(expect_context::<HostedClient>());
    let groups = create_rw_signal(LoadState::<Vec<DocumentGroup>>::Loading);

    let load = move || {
        groups.set(LoadState::Loading);
        spawn_local(async move {
            let state = match client.get_value().documents().await {
                Ok(documents) => LoadState::Ready(views::group_documents(&documents)),
                Err(err) => LoadState::Failed(err.to_string()),
            };
            groups.set(state);
        });
    };

    load();

    view! {
      <section class="panel">
        <h2>"Documents"</h2>
        {move || match groups.get() {
          LoadState::Loading => view! { <p class="meta">"Loading..."</p> }.into_view(),
          LoadState::Failed(message) => view! {
            <p class="error">{message}</p>
            <button on:click=move |_| load()>"Try again"</button>
          }.into_view(),
          LoadState::Ready(rows) if rows.is_empty() => view! {
            <p class="meta">"No documents yet."</p>
          }.into_view(),
          LoadState::Ready(rows) => rows.into_iter().map(document_group_view).collect_view(),
        }}
      </section>
    }
}
