/// Decides whether a cross-origin browser request is permitted. Pure
/// string comparison; no side effects.
#[derive(Clone, Debug)]
pub struct OriginGate {
    production_origin: String,
    extra_allowed: Vec<String>,
}

impl OriginGate {
    pub fn new(production_origin: impl Into<String>, extra_allowed: Vec<String>) -> Self {
        Self {
            production_origin: production_origin.into(),
            extra_allowed,
        }
    }

    pub fn is_allowed(&self, origin: Option<&str>) -> bool {
        let Some(origin) = origin else {
            return false;
        };

        // Development hosts, any port.
        if origin.starts_with("http://localhost:") || origin.starts_with("https://localhost:") {
            return true;
        }

        // The production origin, bare or with an explicit port. The Origin
        // header never carries a path, so this admits every sub-path of the
        // domain (e.g. /customer1/, /customer2/).
        if origin == self.production_origin
            || origin.starts_with(&format!("{}:", self.production_origin))
        {
            return true;
        }

        self.extra_allowed.iter().any(|allowed| allowed == origin)
    }
}
