use crate::models::ProjectKind;

pub const INDEX: &str = r#"<!DOCTYPE html>
<html lang="he" dir="rtl">
<head>
    <title>Perek</title>
    <meta charset="utf-8">
    <style>
        body { font-family: Arial, sans-serif; margin: 40px; }
        .info-box { background-color: #f0f8ff; padding: 20px; border-radius: 8px; margin: 20px 0; }
        .endpoint { background-color: #f5f5f5; padding: 10px; margin: 10px 0; border-radius: 4px; font-family: monospace; direction: ltr; }
    </style>
</head>
<body>
    <h1>Perek</h1>

    <div class="info-box">
        <h2>סדנת כתיבה</h2>
        <p>עבודה על תקציר, חלוקה לפרקים, מתווי סצנות ודיונים עם המודל.</p>
        <form onsubmit="location.href = '/project/' + this.pid.value + '?kind=' + encodeURIComponent(this.kind.value); return false;">
            <input name="pid" type="number" min="1" placeholder="מספר פרויקט" required>
            <select name="kind">
                <option value="פרוזה">פרוזה</option>
                <option value="קומיקס">קומיקס</option>
            </select>
            <button>פתח</button>
        </form>
    </div>

    <h2>Endpoints</h2>
    <div class="endpoint">GET /project/{pid}?kind=... - Project page</div>
    <div class="endpoint">GET /health - Health check</div>
</body>
</html>
"#;

/// Project page. The script only forwards clicks and swaps returned fragments;
/// `.buffer-update` elements in a fragment overwrite the named editor.
pub fn project_page(project_id: u64, kind: ProjectKind) -> String {
    let (kind_slug, prose_controls) = match kind {
        ProjectKind::Prose => (
            "prose",
            r#"<label>מילים לפרק: <input id="prose_min_words" type="number" value="1500"> עד <input id="prose_max_words" type="number" value="3000"></label>"#,
        ),
        ProjectKind::Comic => ("comic", ""),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="he" dir="rtl">
<head>
    <title>Perek · פרויקט {project_id}</title>
    <meta charset="utf-8">
    <style>
        body {{ font-family: Arial, sans-serif; margin: 24px; }}
        textarea {{ width: 100%; min-height: 160px; }}
        .muted {{ color: #666; }}
        .error {{ color: #b00; }}
        .box, .chapter-card, .outline-card {{ border: 1px solid #ddd; border-radius: 6px; padding: 8px; margin: 6px 0; }}
        .turn.q .bubble {{ background: #eef; }}
        .turn.a .bubble {{ background: #efe; }}
        .bubble {{ padding: 6px 10px; border-radius: 8px; margin: 4px 0; white-space: pre-wrap; }}
        .linklike {{ background: none; border: none; color: #06c; cursor: pointer; }}
    </style>
</head>
<body>
<div id="app" data-project-id="{project_id}" data-project-kind="{kind_slug}">
    <section>
        <h3>תקציר</h3>
        <textarea id="synopsisArea"></textarea>
        <div class="btnrow">
            <button data-action="loadSynopsis">טען</button>
            <button data-action="saveSynopsis">שמור תקציר</button>
            <button data-action="history">היסטוריה</button>
            <button data-action="cards">תצוגת כרטיסיות</button>
            <button data-action="divide">חלק תקציר לפרקים</button>
            <button data-action="openBuilder">בניית תקציר</button>
            {prose_controls}
        </div>
        <div id="notices"></div>
        <div id="synopsisHistory"></div>
        <div id="synopsisCardView"></div>
    </section>

    <section>
        <h3>חלוקה לפרקים</h3>
        <textarea id="divisionResultArea"></textarea>
        <button data-action="acceptDivision">העבר לעורך</button>
        <button data-action="discussDivision">💬 דיון על החלוקה</button>
    </section>

    <section>
        <h3>טיוטת תקציר</h3>
        <textarea id="synopsisBuilderArea"></textarea>
        <button data-action="saveDraft">שמור טיוטה</button>
        <button data-action="transferDraft">העבר לעורך התקציר</button>
    </section>

    <section>
        <div id="discussion"></div>
        <div id="proposal"></div>
        <textarea id="discussionInput" style="min-height: 60px;"></textarea>
        <input id="temperature" type="number" step="0.1" min="0" max="2" placeholder="0.7">
        <input id="persona" placeholder="partner">
        <button data-action="send">שלח</button>
        <button data-action="summarize">סכם ועדכן</button>
        <button data-action="closeDiscussion">סגור</button>
    </section>

    <section>
        <div id="output"></div>
        <div id="sceneDraft"></div>
        <div id="chat"></div>
        <textarea id="question" style="min-height: 60px;"></textarea>
        <button data-action="ask">שאל</button>
    </section>
</div>
<script>
const base = '/project/' + document.getElementById('app').dataset.projectId;
const val = (id) => {{ const el = document.getElementById(id); return el ? el.value : ''; }};
let discussionKind = null;

async function request(path, fields, method) {{
    const init = method === 'GET' ? {{}} : {{ method: 'POST', body: new URLSearchParams(fields || {{}}) }};
    const res = await fetch(base + path, init);
    return res.text();
}}

function swap(id, html) {{
    const el = document.getElementById(id);
    el.innerHTML = html;
    el.querySelectorAll('.buffer-update').forEach((update) => {{
        const target = document.getElementById(update.dataset.target);
        if (target) target.value = update.value;
        update.remove();
    }});
}}

function editors() {{
    return {{ synopsis: val('synopsisArea'), division: val('divisionResultArea'), draft: val('synopsisBuilderArea') }};
}}

async function openDiscussion(kind, fields) {{
    discussionKind = kind;
    swap('proposal', '');
    swap('discussion', await request('/discussion/' + kind + '/open', fields));
}}

const actions = {{
    loadSynopsis: async () => swap('notices', await request('/synopsis', null, 'GET')),
    saveSynopsis: async () => swap('notices', await request('/synopsis', {{ text: val('synopsisArea') }})),
    history: async () => swap('synopsisHistory', await request('/synopsis/history', null, 'GET')),
    cards: async () => swap('synopsisCardView', await request('/synopsis/cards', {{ text: val('synopsisArea') }})),
    divide: async () => swap('notices', await request('/synopsis/divide', {{
        text: val('synopsisArea'),
        words_per_chapter_min: val('prose_min_words'),
        words_per_chapter_max: val('prose_max_words'),
    }})),
    acceptDivision: async () => swap('notices', await request('/division/accept')),
    discussDivision: () => openDiscussion('division', {{ division: val('divisionResultArea') }}),
    openBuilder: () => openDiscussion('synopsis', {{ synopsis: val('synopsisArea') }}),
    saveDraft: async () => swap('notices', await request('/discussion/synopsis/save', {{ draft: val('synopsisBuilderArea') }})),
    transferDraft: async () => swap('notices', await request('/discussion/synopsis/transfer', {{ draft: val('synopsisBuilderArea') }})),
    send: async () => {{
        if (!discussionKind) return;
        const fields = {{ text: val('discussionInput'), temperature: val('temperature'), persona: val('persona') }};
        if (discussionKind === 'synopsis') fields.draft = val('synopsisBuilderArea');
        document.getElementById('discussionInput').value = '';
        swap('discussion', await request('/discussion/' + discussionKind + '/send', fields));
    }},
    summarize: async () => {{
        if (!discussionKind) return;
        const fields = discussionKind === 'synopsis' ? {{ draft: val('synopsisBuilderArea') }} : {{}};
        swap('proposal', await request('/discussion/' + discussionKind + '/summarize', fields));
    }},
    closeDiscussion: async () => {{
        if (!discussionKind) return;
        await request('/discussion/' + discussionKind + '/close');
        discussionKind = null;
        swap('discussion', '');
        swap('proposal', '');
    }},
    ask: async () => {{
        const html = await request('/ask', {{ text: val('question') }});
        document.getElementById('question').value = '';
        document.getElementById('chat').insertAdjacentHTML('beforeend', html);
    }},
}};

// One outstanding call per control: the button stays disabled until its call settles.
document.addEventListener('click', async (event) => {{
    const button = event.target.closest('button');
    if (!button || button.disabled) return;
    button.disabled = true;
    try {{
        await dispatch(button);
    }} finally {{
        button.disabled = false;
    }}
}});

async function dispatch(button) {{
    const data = button.dataset;
    if (data.action && actions[data.action]) {{
        await actions[data.action]();
    }} else if (button.matches('.write-chapter-btn')) {{
        swap('output', await request('/chapters/write', {{ title: data.chapterTitle }}));
    }} else if (button.matches('.discuss-chapter-btn')) {{
        await openDiscussion('chapter', {{ title: data.chapterTitle, content: data.content, synopsis: val('synopsisArea') }});
    }} else if (button.matches('.view-outline-btn')) {{
        swap('output', await request('/outline?title=' + encodeURIComponent(data.chapterTitle), null, 'GET'));
    }} else if (button.matches('.save-outline-btn')) {{
        const source = button.closest('.outline-panel').querySelector('.outline-source').value;
        swap('notices', await request('/outline', {{ title: data.chapterTitle, text: source }}));
    }} else if (button.matches('.write-scene-btn')) {{
        const description = document.getElementById(data.cardId).textContent;
        swap('sceneDraft', await request('/scenes/write', {{ title: data.sceneTitle, content: description }}));
    }} else if (button.matches('.confirm-merge-btn')) {{
        swap('proposal', await request('/discussion/' + data.kind + '/confirm', editors()));
        if (data.kind !== 'synopsis') {{ discussionKind = null; swap('discussion', ''); }}
    }} else if (button.matches('.reject-merge-btn')) {{
        swap('proposal', await request('/discussion/' + data.kind + '/reject'));
    }} else if (button.matches('.restore-synopsis-btn')) {{
        document.getElementById('synopsisArea').value = button.closest('.li').querySelector('.box').textContent;
    }}
}}
</script>
</body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prose_page_has_word_count_controls() {
        let html = project_page(5, ProjectKind::Prose);
        assert!(html.contains(r#"data-project-id="5""#));
        assert!(html.contains(r#"<input id="prose_min_words""#));
        assert!(!project_page(5, ProjectKind::Comic).contains(r#"<input id="prose_min_words""#));
    }

    #[test]
    fn buttons_are_disabled_while_their_call_runs() {
        let html = project_page(1, ProjectKind::Prose);
        assert!(html.contains("button.disabled = true;"));
        assert!(html.contains("finally"));
        assert!(html.contains("'.write-scene-btn'"));
        assert!(html.contains(r#"<div id="sceneDraft"></div>"#));
    }
}
