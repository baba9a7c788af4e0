use fieldscope_protocol::Analyst;
use fieldscope_protocol::Client;
use fieldscope_protocol::Entity;
use fieldscope_protocol::Farm;
use fieldscope_protocol::Role;

pub fn analyst(id: &str, name: &str) -> Analyst {
    Analyst {
        id: id.to_string(),
        name: name.to_string(),
        email: Some(format!("{id}@example.com")),
        role: Role::Analyst,
        qualification: None,
    }
}

pub fn client(id: &str, name: &str, analyst_id: &str) -> Client {
    Client {
        id: id.to_string(),
        name: name.to_string(),
        email: None,
        phone: None,
        document: None,
        analyst_id: analyst_id.to_string(),
        created_at: None,
        updated_at: None,
    }
}

pub fn farm(id: &str, name: &str, client_id: &str) -> Farm {
    Farm {
        id: id.to_string(),
        name: name.to_string(),
        client_id: client_id.to_string(),
        production_system: None,
        city: None,
        state: None,
        area_hectares: None,
    }
}

/// `count` clients of `analyst_id` named `Client 001`, `Client 002`, ...
/// Ids are `{analyst_id}-c{n}`.
pub fn numbered_clients(analyst_id: &str, count: usize) -> Vec<Entity> {
    (1..=count)
        .map(|n| {
            Entity::Client(client(
                &format!("{analyst_id}-c{n}"),
                &format!("Client {n:03}"),
                analyst_id,
            ))
        })
        .collect()
}

/// Same shape as [`numbered_clients`] for farms of `client_id`.
pub fn numbered_farms(client_id: &str, count: usize) -> Vec<Entity> {
    (1..=count)
        .map(|n| {
            Entity::Farm(farm(
                &format!("{client_id}-f{n}"),
                &format!("Farm {n:03}"),
                client_id,
            ))
        })
        .collect()
}

/// Two analysts; a1 owns Alpha and Bravo, a2 owns Zulu. Alpha has two farms.
pub fn small_portfolio() -> Vec<Entity> {
    vec![
        analyst("a1", "Ana").into(),
        analyst("a2", "Bruno").into(),
        client("c2", "Bravo", "a1").into(),
        client("c1", "Alpha", "a1").into(),
        client("c9", "Zulu", "a2").into(),
        farm("f2", "Santa Rita", "c1").into(),
        farm("f1", "Boa Vista", "c1").into(),
        farm("f3", "Cedro", "c2").into(),
    ]
}
