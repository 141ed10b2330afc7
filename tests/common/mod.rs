// tests/common/mod.rs
//
// Canned portal pages and a helper that points a client at an httpmock server.

#![allow(dead_code)]

use httpmock::MockServer;
use qissy::{PortalClient, PortalConfig};
use std::time::Duration;

pub const SERVICE_PATH: &str = "/qisserver/rds";

pub const LOGIN_FORM: &str = r#"<html><body>
  <div class="divloginstatus">Sie sind nicht angemeldet.</div>
  <form method="post" action="/qisserver/rds?state=user&amp;type=1&amp;category=auth.login">
    <label for="asdf">Benutzerkennung</label><input id="asdf" name="asdf" type="text">
    <label for="fdsa">Passwort</label><input id="fdsa" name="fdsa" type="password">
    <input type="submit" name="submit" value="Login">
  </form>
</body></html>"#;

pub const WELCOME_PAGE: &str = r#"<html><body>
  <div class="divloginstatus"><span>Angemeldet als:</span> Erika Mustermann</div>
  <p>Willkommen im Hochschulportal.</p>
</body></html>"#;

pub const STUDY_MENU: &str = r#"<html><body>
  <div class="divloginstatus"><span class="loginstatus">Angemeldet als:</span> Erika Mustermann</div>
  <ul>
    <li><a href="/qisserver/rds?state=verpublish&amp;asi=ASI42">Veranstaltungen</a></li>
    <li><a href="/qisserver/rds?state=notenspiegelStudent&amp;next=tree.vm&amp;nextdir=qispos/notenspiegel/student&amp;menuid=notenspiegelStudent&amp;breadcrumb=notenspiegel&amp;breadCrumbSource=menu&amp;asi=ASI42">Notenspiegel / Studienverlauf</a></li>
  </ul>
</body></html>"#;

pub const STUDY_MENU_WITHOUT_SCORECARDS: &str = r#"<html><body>
  <div class="divloginstatus"><span>Angemeldet als:</span> Erika Mustermann</div>
  <ul><li><a href="/qisserver/rds?state=verpublish&amp;asi=ASI42">Veranstaltungen</a></li></ul>
</body></html>"#;

pub fn index_page(rows: &[(&str, &str)]) -> String {
    let items: String = rows
        .iter()
        .map(|(title, id)| {
            format!(
                r#"<li class="treelist">{title}
                     <a class="regular" title="Leistungen für {title} anzeigen" href="/qisserver/rds?state=notenspiegelStudent&amp;struct=auswahlBaum&amp;nodeID={id}&amp;expand=0&amp;asi=ASI42"><img src="/QIS/images/his_info3.gif" alt="Leistungen"></a>
                   </li>"#
            )
        })
        .collect();
    format!(
        r#"<html><body><form><ul class="treelist"><li class="treelist">Abschluss Bachelor<ul class="treelist">{}</ul></li></ul></form></body></html>"#,
        items
    )
}

pub fn scorecard_page(rows: &[(&str, &str, &str)]) -> String {
    let body: String = rows
        .iter()
        .map(|(title, grade, credits)| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>01.02.2018</td></tr>",
                title, grade, credits
            )
        })
        .collect();
    format!(
        r#"<html><body>
          <div class="divloginstatus"><span>Angemeldet als:</span> Erika Mustermann</div>
          <table><tr><td>Notenspiegel</td></tr></table>
          <table>
            <tr><th>Prüfungstext</th><th>Note</th><th>Credits</th><th>Datum</th></tr>
            {}
          </table>
        </body></html>"#,
        body
    )
}

pub fn config_for(server: &MockServer) -> PortalConfig {
    PortalConfig::new(server.base_url(), SERVICE_PATH).with_timeout(Duration::from_secs(5))
}

pub fn client_for(server: &MockServer) -> PortalClient {
    PortalClient::new(config_for(server)).expect("client should build")
}
